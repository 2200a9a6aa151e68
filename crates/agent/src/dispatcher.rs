use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use parley_core::{ActionDirective, ConnectionContext, DomainError, Filter, Record, ResourceKind};
use parley_db::repositories::{wrap_list, wrap_record};
use parley_db::{RepositoryError, ResourceRepository};

use crate::gateway::{CrmGateway, GatewayError, ResourceQuery, DEFAULT_PAGE_LENGTH};
use crate::guardrails::{ActionDecision, ActionPolicy};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("invalid action parameters: {0}")]
    InvalidParameters(String),
}

/// What happened to a directive. Only `Completed` carries a result for the caller.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    NotRequested,
    Skipped { reason: String },
    Completed { result: Value },
    Failed { error: String },
}

impl ActionOutcome {
    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Completed { result } => Some(result),
            _ => None,
        }
    }

    pub fn into_result(self) -> Option<Value> {
        match self {
            Self::Completed { result } => Some(result),
            _ => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::NotRequested => "not_requested",
            Self::Skipped { .. } => "skipped",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Runs directives against the simulated store or the live CRM, chosen per connection.
#[derive(Clone)]
pub struct ActionDispatcher {
    resources: Arc<dyn ResourceRepository>,
    gateway: Arc<dyn CrmGateway>,
    policy: ActionPolicy,
    default_page_length: u32,
}

impl ActionDispatcher {
    pub fn new(
        resources: Arc<dyn ResourceRepository>,
        gateway: Arc<dyn CrmGateway>,
        policy: ActionPolicy,
    ) -> Self {
        Self { resources, gateway, policy, default_page_length: DEFAULT_PAGE_LENGTH }
    }

    pub fn with_default_page_length(mut self, page_length: u32) -> Self {
        self.default_page_length = page_length;
        self
    }

    pub fn policy(&self) -> &ActionPolicy {
        &self.policy
    }

    pub fn gateway(&self) -> &Arc<dyn CrmGateway> {
        &self.gateway
    }

    /// Never fails: errors are logged and reported as `Failed`.
    pub async fn dispatch(
        &self,
        action: Option<&ActionDirective>,
        context: &ConnectionContext,
    ) -> ActionOutcome {
        let Some(directive) = action else {
            return ActionOutcome::NotRequested;
        };

        let attempt = match self.policy.evaluate(directive) {
            ActionDecision::Skip { reason_code } => {
                info!(
                    event_name = "dispatch.action.skipped",
                    action_type = %directive.kind,
                    reason = reason_code,
                    "action directive skipped"
                );
                return ActionOutcome::Skipped { reason: reason_code.to_string() };
            }
            ActionDecision::Fetch { doctype } => {
                match read_query(directive, doctype, self.default_page_length) {
                    Ok(query) => self.fetch(context, &query).await,
                    Err(error) => Err(error),
                }
            }
            ActionDecision::Create { doctype } => match create_data(directive) {
                Ok(data) => self.create(context, &doctype, data).await,
                Err(error) => Err(error),
            },
        };

        match attempt {
            Ok(result) => ActionOutcome::Completed { result },
            Err(error) => {
                warn!(
                    event_name = "dispatch.action.failed",
                    action_type = %directive.kind,
                    simulation = context.is_simulation(),
                    error = %error,
                    "action directive failed"
                );
                ActionOutcome::Failed { error: error.to_string() }
            }
        }
    }

    /// Simulated reads ignore `fields` and `limit`; unknown doctypes read as empty.
    pub async fn fetch(
        &self,
        context: &ConnectionContext,
        query: &ResourceQuery,
    ) -> Result<Value, DispatchError> {
        if !context.is_simulation() {
            return Ok(self.gateway.fetch_resources(context, query).await?);
        }

        let Some(kind) = ResourceKind::parse(&query.doctype) else {
            return Ok(wrap_list(Vec::new()));
        };
        let filters = Filter::list_from_value(&query.filters);
        let records = self.resources.list(kind, &filters).await?;
        Ok(wrap_list(records))
    }

    pub async fn create(
        &self,
        context: &ConnectionContext,
        doctype: &str,
        data: Record,
    ) -> Result<Value, DispatchError> {
        if !context.is_simulation() {
            return Ok(self.gateway.create_resource(context, doctype, &data).await?);
        }

        let kind = ResourceKind::parse(doctype)
            .ok_or_else(|| DomainError::UnsupportedResourceKind(doctype.to_string()))?;
        let record = self.resources.create(kind, data).await?;
        Ok(wrap_record(record))
    }

    /// Simulation always connects; live connections must answer `get_logged_user`.
    pub async fn validate_connection(
        &self,
        context: &ConnectionContext,
    ) -> Result<Value, DispatchError> {
        if context.is_simulation() {
            return Ok(json!({ "message": "simulation" }));
        }
        Ok(self.gateway.logged_user(context).await?)
    }
}

fn read_query(
    directive: &ActionDirective,
    doctype: String,
    default_limit: u32,
) -> Result<ResourceQuery, DispatchError> {
    let mut query = ResourceQuery::new(doctype).with_limit(default_limit);

    if let Some(filters) = directive.parameter("filters") {
        if !filters.is_array() {
            return Err(DispatchError::InvalidParameters("`filters` must be an array".into()));
        }
        query = query.with_filters(filters.clone());
    }

    if let Some(fields) = directive.parameter("fields") {
        if !fields.is_array() {
            return Err(DispatchError::InvalidParameters("`fields` must be an array".into()));
        }
        query = query.with_fields(fields.clone());
    }

    if let Some(limit) = directive.parameter("limit") {
        let limit = limit
            .as_u64()
            .and_then(|limit| u32::try_from(limit).ok())
            .ok_or_else(|| {
                DispatchError::InvalidParameters("`limit` must be a non-negative integer".into())
            })?;
        query = query.with_limit(limit);
    }

    Ok(query)
}

fn create_data(directive: &ActionDirective) -> Result<Record, DispatchError> {
    match directive.parameter("data") {
        None => Ok(Record::new()),
        Some(Value::Object(data)) => Ok(data.clone()),
        Some(_) => Err(DispatchError::InvalidParameters("`data` must be an object".into())),
    }
}
