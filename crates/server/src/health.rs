use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use parley_agent::AgentRuntime;
use parley_core::UserId;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    pub runtime: AgentRuntime,
    pub llm_credentials: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub exchange_store: HealthCheck,
    pub llm: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// 503 only when the exchange store is unreachable. A missing model key still serves fallback
/// replies, so it degrades the report without failing readiness.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let exchange_store = exchange_store_check(&state.runtime).await;
    let llm = llm_check(&state);
    let store_ready = exchange_store.status == "ready";
    let all_ready = store_ready && llm.status == "ready";

    let payload = HealthResponse {
        status: if all_ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "parley-server runtime initialized".to_string(),
        },
        exchange_store,
        llm,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if store_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn exchange_store_check(runtime: &AgentRuntime) -> HealthCheck {
    let backend = runtime.exchange_backend();
    match runtime.list_exchanges(UserId(0), Some(1)).await {
        Ok(_) => HealthCheck { status: "ready", detail: format!("{backend} exchange store reachable") },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("{backend} exchange store query failed: {error}"),
        },
    }
}

fn llm_check(state: &HealthState) -> HealthCheck {
    let model = state.runtime.model();
    if state.llm_credentials {
        HealthCheck { status: "ready", detail: format!("model `{model}` configured") }
    } else {
        HealthCheck {
            status: "degraded",
            detail: format!("model `{model}` has no api key; replies will use the fallback"),
        }
    }
}
