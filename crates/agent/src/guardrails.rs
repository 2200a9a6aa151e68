use parley_core::domain::interpretation::{CREATE_ENTITY_ACTION, FETCH_DATA_ACTION};
use parley_core::ActionDirective;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionDecision {
    Fetch { doctype: String },
    Create { doctype: String },
    Skip { reason_code: &'static str },
}

/// Which model-proposed directives may reach the CRM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionPolicy {
    pub fetch_enabled: bool,
    pub create_enabled: bool,
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self { fetch_enabled: true, create_enabled: false }
    }
}

impl ActionPolicy {
    pub fn with_create(mut self, enabled: bool) -> Self {
        self.create_enabled = enabled;
        self
    }

    pub fn evaluate(&self, directive: &ActionDirective) -> ActionDecision {
        let doctype = directive.doctype().map(str::to_string);

        match (directive.kind.as_str(), doctype) {
            (FETCH_DATA_ACTION, _) if !self.fetch_enabled => {
                ActionDecision::Skip { reason_code: "fetch_disabled" }
            }
            (CREATE_ENTITY_ACTION, _) if !self.create_enabled => {
                ActionDecision::Skip { reason_code: "create_disabled" }
            }
            (FETCH_DATA_ACTION | CREATE_ENTITY_ACTION, None) => {
                ActionDecision::Skip { reason_code: "missing_doctype" }
            }
            (FETCH_DATA_ACTION, Some(doctype)) => ActionDecision::Fetch { doctype },
            (CREATE_ENTITY_ACTION, Some(doctype)) => ActionDecision::Create { doctype },
            _ => ActionDecision::Skip { reason_code: "unsupported_action" },
        }
    }
}
