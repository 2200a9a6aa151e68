use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_INTENT: &str = "unknown";
pub const ERROR_INTENT: &str = "error";
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

pub const DEFAULT_RESPONSE: &str = "I'm sorry, I couldn't process that request.";
pub const UNPARSEABLE_REPLY_RESPONSE: &str =
    "I'm sorry, I had trouble processing your request. Please try again.";
pub const PROVIDER_UNAVAILABLE_RESPONSE: &str =
    "I'm sorry, I encountered an error processing your request. Please try again.";

pub const FETCH_DATA_ACTION: &str = "fetch_data";
pub const CREATE_ENTITY_ACTION: &str = "create_entity";

/// Side-effecting follow-up requested by the assistant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDirective {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ActionDirective {
    pub fn new(kind: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self { kind: kind.into(), parameters }
    }

    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key).filter(|value| !value.is_null())
    }

    pub fn doctype(&self) -> Option<&str> {
        self.parameter("doctype").and_then(Value::as_str).filter(|doctype| !doctype.trim().is_empty())
    }

    fn from_value(raw: &Value) -> Option<Self> {
        let object = raw.as_object()?;
        let kind = object.get("type").and_then(Value::as_str).filter(|kind| !kind.is_empty())?;
        let parameters =
            object.get("parameters").and_then(Value::as_object).cloned().unwrap_or_default();
        Some(Self::new(kind, parameters))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interpretation {
    pub intent: String,
    #[serde(rename = "response")]
    pub response_text: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionDirective>,
}

impl Interpretation {
    /// Normalizes a provider reply object, defaulting missing, empty or mistyped fields.
    pub fn from_reply(reply: &Map<String, Value>) -> Self {
        let text_field = |key: &str| {
            reply
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        };

        let intent = text_field("intent").unwrap_or_else(|| DEFAULT_INTENT.to_string());
        let response_text = text_field("response")
            .or_else(|| text_field("responseText"))
            .unwrap_or_else(|| DEFAULT_RESPONSE.to_string());
        let confidence = reply
            .get("confidence")
            .and_then(Value::as_f64)
            .map(clamp_confidence)
            .unwrap_or(DEFAULT_CONFIDENCE);
        let metadata = reply.get("metadata").and_then(Value::as_object).cloned();
        let action = reply.get("action").and_then(ActionDirective::from_value);

        Self { intent, response_text, confidence, metadata, action }
    }

    pub fn unparseable_reply() -> Self {
        Self::error_with(UNPARSEABLE_REPLY_RESPONSE)
    }

    pub fn provider_unavailable() -> Self {
        Self::error_with(PROVIDER_UNAVAILABLE_RESPONSE)
    }

    fn error_with(response_text: &str) -> Self {
        Self {
            intent: ERROR_INTENT.to_string(),
            response_text: response_text.to_string(),
            confidence: 0.0,
            metadata: None,
            action: None,
        }
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return DEFAULT_CONFIDENCE;
    }
    value.clamp(0.0, 1.0)
}

/// Why an interpretation was substituted rather than taken from the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FallbackReason {
    UnparseableReply { detail: String },
    ProviderUnavailable { detail: String },
}

impl FallbackReason {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::UnparseableReply { .. } => "unparseable_reply",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::UnparseableReply { detail } | Self::ProviderUnavailable { detail } => detail,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    pub interpretation: Interpretation,
    pub fallback: Option<FallbackReason>,
}

impl Resolved {
    pub fn understood(interpretation: Interpretation) -> Self {
        Self { interpretation, fallback: None }
    }

    pub fn degraded(interpretation: Interpretation, reason: FallbackReason) -> Self {
        Self { interpretation, fallback: Some(reason) }
    }

    pub fn is_degraded(&self) -> bool {
        self.fallback.is_some()
    }
}
