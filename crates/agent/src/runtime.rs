use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use parley_core::config::AppConfig;
use parley_core::{
    ApplicationError, ConnectionContext, Exchange, FallbackReason, Interpretation, NewExchange,
    Resolved, UserId,
};
use parley_db::{ExchangeRepository, SimulatedResourceStore};

use crate::dispatcher::{ActionDispatcher, ActionOutcome};
use crate::gateway::FrappeGateway;
use crate::guardrails::ActionPolicy;
use crate::openai::OpenAiClient;
use crate::resolver::IntentResolver;

#[derive(Clone, Debug)]
pub struct QueryRequest {
    pub user_id: UserId,
    pub query: String,
    pub context: ConnectionContext,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryReply {
    pub exchange: Exchange,
    pub intent: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackReason>,
    #[serde(skip)]
    pub action_outcome: ActionOutcome,
}

/// Owns the resolve, record, dispatch sequence for one assistant turn.
#[derive(Clone)]
pub struct AgentRuntime {
    resolver: IntentResolver,
    exchanges: Arc<dyn ExchangeRepository>,
    dispatcher: ActionDispatcher,
}

impl AgentRuntime {
    pub fn new(
        resolver: IntentResolver,
        exchanges: Arc<dyn ExchangeRepository>,
        dispatcher: ActionDispatcher,
    ) -> Self {
        Self { resolver, exchanges, dispatcher }
    }

    /// Wires the chat-completions client, the Frappe gateway and a freshly seeded simulated
    /// store around the given exchange recorder.
    pub fn from_config(
        config: &AppConfig,
        exchanges: Arc<dyn ExchangeRepository>,
    ) -> Result<Self, ApplicationError> {
        let llm = OpenAiClient::from_config(&config.llm)
            .map_err(|e| ApplicationError::Configuration(e.to_string()))?;
        let gateway = FrappeGateway::from_config(&config.crm)
            .map_err(|e| ApplicationError::Configuration(e.to_string()))?;
        let dispatcher = ActionDispatcher::new(
            Arc::new(SimulatedResourceStore::seeded()),
            Arc::new(gateway),
            ActionPolicy::default().with_create(config.crm.allow_create),
        )
        .with_default_page_length(config.crm.default_page_length);

        Ok(Self::new(IntentResolver::new(Arc::new(llm)), exchanges, dispatcher))
    }

    pub fn model(&self) -> &str {
        self.resolver.model()
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    pub fn exchange_backend(&self) -> &'static str {
        self.exchanges.backend_name()
    }

    pub async fn process_query(
        &self,
        request: QueryRequest,
        correlation_id: &str,
    ) -> Result<QueryReply, ApplicationError> {
        validate_request(&request)?;
        let QueryRequest { user_id, query, context } = request;

        let resolved = match self.resolver.interpret(&query, &context).await {
            Ok(resolved) => resolved,
            Err(error) => {
                warn!(
                    event_name = "agent.provider.unavailable",
                    correlation_id,
                    user_id = user_id.0,
                    error = %error,
                    "language model unavailable, answering with fallback"
                );
                Resolved::degraded(
                    Interpretation::provider_unavailable(),
                    FallbackReason::ProviderUnavailable { detail: error.to_string() },
                )
            }
        };
        let Resolved { interpretation, fallback } = resolved;

        let exchange = self
            .exchanges
            .record(NewExchange {
                user_id,
                query,
                response: interpretation.response_text.clone(),
                intent: Some(interpretation.intent.clone()),
                metadata: Some(exchange_metadata(&interpretation, fallback.as_ref())),
            })
            .await?;

        let action_outcome =
            self.dispatcher.dispatch(interpretation.action.as_ref(), &context).await;

        info!(
            event_name = "agent.query.processed",
            correlation_id,
            user_id = user_id.0,
            exchange_id = exchange.id.0,
            intent = %interpretation.intent,
            confidence = interpretation.confidence,
            simulation = context.is_simulation(),
            action = action_outcome.status(),
            degraded = fallback.is_some(),
            "assistant turn processed"
        );

        Ok(QueryReply {
            exchange,
            intent: interpretation.intent,
            confidence: interpretation.confidence,
            action_result: action_outcome.result().cloned(),
            fallback,
            action_outcome,
        })
    }

    /// Records an exchange produced outside `process_query`.
    pub async fn record_exchange(&self, exchange: NewExchange) -> Result<Exchange, ApplicationError> {
        if exchange.user_id.0 == 0 {
            return Err(ApplicationError::invalid_request("userId is required"));
        }
        if exchange.query.trim().is_empty() || exchange.response.trim().is_empty() {
            return Err(ApplicationError::invalid_request("query and response are required"));
        }
        Ok(self.exchanges.record(exchange).await?)
    }

    pub async fn list_exchanges(
        &self,
        user_id: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<Exchange>, ApplicationError> {
        Ok(self.exchanges.list_for_user(user_id, limit).await?)
    }

    pub async fn clear_exchanges(&self, user_id: UserId) -> Result<(), ApplicationError> {
        Ok(self.exchanges.clear_for_user(user_id).await?)
    }
}

fn validate_request(request: &QueryRequest) -> Result<(), ApplicationError> {
    if request.user_id.0 == 0 {
        return Err(ApplicationError::invalid_request("userId is required"));
    }
    if request.query.trim().is_empty() {
        return Err(ApplicationError::invalid_request("query is required"));
    }
    if let Some(field) = request.context.missing_field() {
        return Err(ApplicationError::invalid_request(format!("{field} is required")));
    }
    Ok(())
}

/// Provider outages record only the error. Every other turn records the confidence, the model's
/// own metadata and the proposed action.
fn exchange_metadata(interpretation: &Interpretation, fallback: Option<&FallbackReason>) -> Value {
    let mut metadata = Map::new();

    let outage =
        fallback.filter(|reason| matches!(reason, FallbackReason::ProviderUnavailable { .. }));
    if let Some(reason) = outage {
        metadata.insert("error".to_string(), Value::String(reason.detail().to_string()));
        metadata.insert("fallback".to_string(), Value::String(reason.reason_code().to_string()));
        return Value::Object(metadata);
    }

    metadata.insert("confidence".to_string(), Value::from(interpretation.confidence));
    if let Some(extra) = &interpretation.metadata {
        metadata.extend(extra.clone());
    }
    if let Some(action) = &interpretation.action {
        if let Ok(action) = serde_json::to_value(action) {
            metadata.insert("action".to_string(), action);
        }
    }
    if let Some(reason) = fallback {
        metadata.insert("fallback".to_string(), Value::String(reason.reason_code().to_string()));
    }
    Value::Object(metadata)
}
