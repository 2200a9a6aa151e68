use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use parley_agent::{
    AgentRuntime, DispatchError, GatewayError, QueryReply, QueryRequest, ResourceQuery,
};
use parley_core::{ApplicationError, ConnectionContext, Exchange, InterfaceError, NewExchange, UserId};

const MISSING_PARAMETERS: &str = "Missing required parameters";
const CONNECTION_FAILED: &str = "Failed to connect to Frappe CRM. Please check your credentials.";

#[derive(Clone)]
pub struct AssistantState {
    pub runtime: AgentRuntime,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

type ApiFailure = (StatusCode, Json<ApiError>);

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CredentialsBody {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl CredentialsBody {
    fn context(&self) -> ConnectionContext {
        ConnectionContext::new(
            self.api_url.clone().unwrap_or_default(),
            self.api_key.clone().unwrap_or_default(),
            self.api_secret.clone().unwrap_or_default(),
        )
    }

    fn complete_context(&self) -> Option<ConnectionContext> {
        let context = self.context();
        context.missing_field().is_none().then_some(context)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessQueryBody {
    pub user_id: Option<i64>,
    pub query: Option<String>,
    #[serde(flatten)]
    pub credentials: CredentialsBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecordExchangeBody {
    pub user_id: Option<i64>,
    pub query: Option<String>,
    pub response: Option<String>,
    pub intent: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProxyQueryBody {
    #[serde(flatten)]
    pub credentials: CredentialsBody,
    pub doctype: Option<String>,
    pub filters: Option<Value>,
    pub fields: Option<Value>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProxyExecuteBody {
    #[serde(flatten)]
    pub credentials: CredentialsBody,
    pub method: Option<String>,
    pub args: Option<Value>,
}

pub fn router(state: AssistantState) -> Router {
    Router::new()
        .route("/api/process-query", post(process_query))
        .route("/api/conversations", post(record_exchange))
        .route("/api/conversations/{user_id}", get(list_exchanges).delete(clear_exchanges))
        .route("/api/frappe/query", post(proxy_query))
        .route("/api/frappe/execute", post(proxy_execute))
        .route("/api/connection/validate", post(validate_connection))
        .with_state(state)
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

fn bad_request(message: &str) -> ApiFailure {
    (StatusCode::BAD_REQUEST, Json(ApiError { message: message.to_string(), correlation_id: None }))
}

fn application_failure(error: ApplicationError, correlation_id: &str) -> ApiFailure {
    let interface = error.into_interface(correlation_id);
    let (status, message) = match &interface {
        InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
        InterfaceError::ServiceUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, interface.user_message().to_string())
        }
        InterfaceError::Internal { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, interface.user_message().to_string())
        }
    };
    if status != StatusCode::BAD_REQUEST {
        warn!(
            event_name = "api.request.failed",
            correlation_id,
            error = %interface,
            "request failed"
        );
    }
    (status, Json(ApiError { message, correlation_id: Some(interface.correlation_id().to_string()) }))
}

fn parse_user_id(raw: &str) -> Result<UserId, ApiFailure> {
    raw.trim().parse::<i64>().map(UserId).map_err(|_| bad_request("Invalid user ID"))
}

pub async fn process_query(
    State(state): State<AssistantState>,
    Json(body): Json<ProcessQueryBody>,
) -> Result<Json<QueryReply>, ApiFailure> {
    let correlation_id = correlation_id();
    let request = QueryRequest {
        user_id: UserId(body.user_id.unwrap_or_default()),
        query: body.query.clone().unwrap_or_default(),
        context: body.credentials.context(),
    };

    state
        .runtime
        .process_query(request, &correlation_id)
        .await
        .map(Json)
        .map_err(|error| application_failure(error, &correlation_id))
}

pub async fn record_exchange(
    State(state): State<AssistantState>,
    Json(body): Json<RecordExchangeBody>,
) -> Result<(StatusCode, Json<Exchange>), ApiFailure> {
    let correlation_id = correlation_id();
    let exchange = NewExchange {
        user_id: UserId(body.user_id.unwrap_or_default()),
        query: body.query.unwrap_or_default(),
        response: body.response.unwrap_or_default(),
        intent: body.intent,
        metadata: body.metadata,
    };

    let recorded = state
        .runtime
        .record_exchange(exchange)
        .await
        .map_err(|error| application_failure(error, &correlation_id))?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

pub async fn list_exchanges(
    State(state): State<AssistantState>,
    Path(user_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Exchange>>, ApiFailure> {
    let user_id = parse_user_id(&user_id)?;
    let limit = match params.limit.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<usize>().map_err(|_| bad_request("Invalid limit"))?),
    };

    let correlation_id = correlation_id();
    state
        .runtime
        .list_exchanges(user_id, limit)
        .await
        .map(Json)
        .map_err(|error| application_failure(error, &correlation_id))
}

pub async fn clear_exchanges(
    State(state): State<AssistantState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    let user_id = parse_user_id(&user_id)?;
    let correlation_id = correlation_id();

    state
        .runtime
        .clear_exchanges(user_id)
        .await
        .map_err(|error| application_failure(error, &correlation_id))?;
    info!(
        event_name = "api.exchanges.cleared",
        correlation_id = %correlation_id,
        user_id = user_id.0,
        "exchange history cleared"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Upstream CRM failures are relayed with their status and body unchanged.
fn proxy_failure(error: DispatchError, correlation_id: &str) -> (StatusCode, Json<Value>) {
    warn!(
        event_name = "api.proxy.failed",
        correlation_id,
        error = %error,
        "CRM proxy request failed"
    );
    match error {
        DispatchError::Gateway(GatewayError::Upstream { status, body }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(body))
        }
        DispatchError::Gateway(GatewayError::InvalidUrl(url)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": format!("Invalid CRM url `{url}`") })),
        ),
        DispatchError::Gateway(other) => {
            (StatusCode::BAD_GATEWAY, Json(json!({ "message": other.to_string() })))
        }
        other => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": other.to_string() }))),
    }
}

fn missing_parameters() -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "message": MISSING_PARAMETERS })))
}

pub async fn proxy_query(
    State(state): State<AssistantState>,
    Json(body): Json<ProxyQueryBody>,
) -> (StatusCode, Json<Value>) {
    let doctype = body.doctype.as_deref().map(str::trim).filter(|doctype| !doctype.is_empty());
    let (Some(context), Some(doctype)) = (body.credentials.complete_context(), doctype) else {
        return missing_parameters();
    };

    let mut query = ResourceQuery::new(doctype);
    if let Some(filters) = body.filters {
        query = query.with_filters(filters);
    }
    if let Some(fields) = body.fields {
        query = query.with_fields(fields);
    }
    if let Some(limit) = body.limit {
        query = query.with_limit(limit);
    }

    let correlation_id = correlation_id();
    match state.runtime.dispatcher().fetch(&context, &query).await {
        Ok(result) => (StatusCode::OK, Json(result)),
        Err(error) => proxy_failure(error, &correlation_id),
    }
}

pub async fn proxy_execute(
    State(state): State<AssistantState>,
    Json(body): Json<ProxyExecuteBody>,
) -> (StatusCode, Json<Value>) {
    let method = body.method.as_deref().map(str::trim).filter(|method| !method.is_empty());
    let (Some(context), Some(method)) = (body.credentials.complete_context(), method) else {
        return missing_parameters();
    };
    if context.is_simulation() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Method calls are not available in simulation mode" })),
        );
    }

    let args = body.args.unwrap_or_else(|| json!({}));
    let correlation_id = correlation_id();
    match state.runtime.dispatcher().gateway().call_method(&context, method, &args).await {
        Ok(result) => (StatusCode::OK, Json(result)),
        Err(error) => proxy_failure(DispatchError::Gateway(error), &correlation_id),
    }
}

pub async fn validate_connection(
    State(state): State<AssistantState>,
    Json(body): Json<CredentialsBody>,
) -> (StatusCode, Json<Value>) {
    let Some(context) = body.complete_context() else {
        return missing_parameters();
    };

    match state.runtime.dispatcher().validate_connection(&context).await {
        Ok(user) => (
            StatusCode::OK,
            Json(json!({
                "connected": true,
                "simulation": context.is_simulation(),
                "user": user.get("message").cloned().unwrap_or(user),
            })),
        ),
        Err(error) => {
            warn!(
                event_name = "api.connection.rejected",
                error = %error,
                "CRM connection validation failed"
            );
            (StatusCode::UNAUTHORIZED, Json(json!({ "message": CONNECTION_FAILED })))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        extract::{Path, Query, State},
        http::{Request, StatusCode},
        Json,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use parley_agent::{
        ActionDispatcher, ActionPolicy, AgentRuntime, FrappeGateway, IntentResolver, LlmClient,
        ProviderError,
    };
    use parley_db::{InMemoryExchangeRepository, SimulatedResourceStore};

    use super::{
        clear_exchanges, list_exchanges, process_query, proxy_execute, proxy_query, router,
        validate_connection, AssistantState, CredentialsBody, ListParams, ProcessQueryBody,
        ProxyExecuteBody, ProxyQueryBody,
    };

    struct FixedReply(Option<&'static str>);

    #[async_trait]
    impl LlmClient for FixedReply {
        async fn complete_json(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
            self.0.map(str::to_string).ok_or(ProviderError::MissingCredentials)
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    fn state(reply: Option<&'static str>) -> State<AssistantState> {
        let dispatcher = ActionDispatcher::new(
            Arc::new(SimulatedResourceStore::seeded()),
            Arc::new(FrappeGateway::new(Duration::from_secs(5)).expect("gateway")),
            ActionPolicy::default(),
        );
        let runtime = AgentRuntime::new(
            IntentResolver::new(Arc::new(FixedReply(reply))),
            Arc::new(InMemoryExchangeRepository::default()),
            dispatcher,
        );
        State(AssistantState { runtime })
    }

    fn credentials(api_url: &str) -> CredentialsBody {
        CredentialsBody {
            api_url: Some(api_url.to_string()),
            api_key: Some("key".to_string()),
            api_secret: Some("secret".to_string()),
        }
    }

    fn query_body(user_id: i64, query: &str) -> ProcessQueryBody {
        ProcessQueryBody {
            user_id: Some(user_id),
            query: Some(query.to_string()),
            credentials: credentials("simulation"),
        }
    }

    #[tokio::test]
    async fn process_query_returns_exchange_and_action_result() {
        let state = state(Some(
            r#"{"intent": "get_leads", "response": "Here you go.", "confidence": 0.95,
                "action": {"type": "fetch_data", "parameters": {"doctype": "Lead",
                "filters": [["status", "=", "Qualified"]]}}}"#,
        ));

        let Json(reply) = process_query(state, Json(query_body(3, "qualified leads")))
            .await
            .expect("reply");
        let body = serde_json::to_value(&reply).expect("serialize");

        assert_eq!(body["intent"], "get_leads");
        assert_eq!(body["exchange"]["userId"], 3);
        let results = body["actionResult"]["data"]["results"].as_array().cloned().unwrap_or_default();
        assert_eq!(results.len(), 2);
        assert!(body.get("fallback").is_none());
    }

    #[tokio::test]
    async fn process_query_rejects_missing_credentials_with_bad_request() {
        let mut body = query_body(3, "hello");
        body.credentials.api_key = None;

        let error = process_query(state(Some("{}")), Json(body)).await.err();

        let (status, Json(payload)) = error.expect("should fail");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(payload.message.contains("apiKey"));
        assert!(payload.correlation_id.is_some());
    }

    #[tokio::test]
    async fn provider_outage_still_answers_and_is_listed() {
        let state = state(None);

        let Json(reply) =
            process_query(state.clone(), Json(query_body(8, "hello"))).await.expect("reply");
        let Json(listed) = list_exchanges(
            state,
            Path("8".to_string()),
            Query(ListParams { limit: Some("10".to_string()) }),
        )
        .await
        .expect("list");

        assert_eq!(reply.intent, "error");
        assert_eq!(reply.confidence, 0.0);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].intent.as_deref(), Some("error"));
    }

    #[tokio::test]
    async fn list_rejects_non_numeric_user_id() {
        let result =
            list_exchanges(state(None), Path("abc".to_string()), Query(ListParams::default())).await;

        let (status, Json(payload)) = result.err().expect("should fail");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(payload.message, "Invalid user ID");
    }

    #[tokio::test]
    async fn clear_returns_no_content_and_empties_history() {
        let state = state(None);
        let _reply =
            process_query(state.clone(), Json(query_body(5, "hello"))).await.expect("reply");

        let status = clear_exchanges(state.clone(), Path("5".to_string())).await.expect("clear");
        let Json(listed) =
            list_exchanges(state, Path("5".to_string()), Query(ListParams::default()))
                .await
                .expect("list");

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn simulated_proxy_query_returns_wrapped_results() {
        let (status, Json(body)) = proxy_query(
            state(None),
            Json(ProxyQueryBody {
                credentials: credentials("simulation"),
                doctype: Some("Opportunity".to_string()),
                filters: Some(json!([["status", "=", "Closed"]])),
                ..ProxyQueryBody::default()
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["results"][0]["name"], "OPTY-00004");
    }

    #[tokio::test]
    async fn live_proxy_query_relays_upstream_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/resource/Lead"))
            .respond_with(
                ResponseTemplate::new(417).set_body_json(json!({ "exc_type": "ValidationError" })),
            )
            .mount(&server)
            .await;

        let (status, Json(body)) = proxy_query(
            state(None),
            Json(ProxyQueryBody {
                credentials: credentials(&server.uri()),
                doctype: Some("Lead".to_string()),
                ..ProxyQueryBody::default()
            }),
        )
        .await;

        assert_eq!(status, StatusCode::EXPECTATION_FAILED);
        assert_eq!(body, json!({ "exc_type": "ValidationError" }));
    }

    #[tokio::test]
    async fn proxy_query_without_doctype_is_bad_request() {
        let (status, Json(body)) = proxy_query(
            state(None),
            Json(ProxyQueryBody {
                credentials: credentials("simulation"),
                ..ProxyQueryBody::default()
            }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Missing required parameters");
    }

    #[tokio::test]
    async fn execute_is_refused_in_simulation_mode() {
        let (status, _) = proxy_execute(
            state(None),
            Json(ProxyExecuteBody {
                credentials: credentials("simulation"),
                method: Some("frappe.client.get_count".to_string()),
                args: None,
            }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn connection_validation_accepts_simulation_and_rejects_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/method/frappe.auth.get_logged_user"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Not Authorized"))
            .mount(&server)
            .await;

        let (simulated, Json(body)) =
            validate_connection(state(None), Json(credentials("simulation"))).await;
        let (live, _) = validate_connection(state(None), Json(credentials(&server.uri()))).await;

        assert_eq!(simulated, StatusCode::OK);
        assert_eq!(body["connected"], Value::Bool(true));
        assert_eq!(live, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn router_wires_conversation_routes() {
        let State(state) = state(None);
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/conversations/12")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
