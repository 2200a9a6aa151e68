use clap::Args;
use parley_agent::{AgentRuntime, QueryRequest};
use parley_core::config::{AppConfig, LoadOptions};
use parley_core::{ApplicationError, ConnectionContext, DomainError, UserId, SIMULATION_API_URL};
use parley_db::open_exchange_store;

use crate::commands::CommandResult;

#[derive(Debug, Clone, Args)]
pub struct AskArgs {
    #[arg(help = "Utterance to interpret")]
    pub query: String,
    #[arg(long, default_value_t = 1, help = "User id the exchange is recorded under")]
    pub user_id: i64,
    #[arg(long, default_value = SIMULATION_API_URL, help = "CRM base url, or `simulation`")]
    pub api_url: String,
    #[arg(long, default_value = "simulation")]
    pub api_key: String,
    #[arg(long, default_value = "simulation")]
    pub api_secret: String,
}

pub fn run(args: AskArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let correlation_id = uuid::Uuid::new_v4().to_string();
    let result = runtime.block_on(async {
        let store = open_exchange_store(&config.database)
            .await
            .map_err(|error| ("exchange_store", error.to_string(), 4u8))?;
        let agent = AgentRuntime::from_config(&config, store.repository)
            .map_err(|error| ("runtime_assembly", error.to_string(), 5u8))?;

        let request = QueryRequest {
            user_id: UserId(args.user_id),
            query: args.query,
            context: ConnectionContext::new(args.api_url, args.api_key, args.api_secret),
        };
        let reply = agent.process_query(request, &correlation_id).await.map_err(|error| {
            let class = match &error {
                ApplicationError::Domain(DomainError::InvalidRequest(_)) => "invalid_request",
                _ => "query_failed",
            };
            (class, error.to_string(), 6u8)
        })?;

        if let Some(pool) = store.pool {
            pool.close().await;
        }
        Ok::<_, (&'static str, String, u8)>(reply)
    });

    match result {
        Ok(reply) => match serde_json::to_value(&reply) {
            Ok(data) => CommandResult::success("ask", reply.exchange.response.clone(), data),
            Err(error) => CommandResult::failure("ask", "serialization", error.to_string(), 7),
        },
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ask", error_class, message, exit_code)
        }
    }
}
