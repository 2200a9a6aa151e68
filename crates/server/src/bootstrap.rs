use parley_agent::AgentRuntime;
use parley_core::config::{AppConfig, ConfigError, LoadOptions};
use parley_core::ApplicationError;
use parley_db::{open_exchange_store, DbPool, StoreOpenError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: Option<DbPool>,
    pub agent_runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    ExchangeStore(#[from] StoreOpenError),
    #[error("runtime assembly failed: {0}")]
    Runtime(#[source] ApplicationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        exchange_backend = ?config.database.backend,
        "starting application bootstrap"
    );

    let store = open_exchange_store(&config.database).await?;
    info!(
        event_name = "system.bootstrap.exchange_store_ready",
        correlation_id = "bootstrap",
        backend = store.repository.backend_name(),
        "exchange store opened"
    );

    let agent_runtime =
        AgentRuntime::from_config(&config, store.repository).map_err(BootstrapError::Runtime)?;

    if !config.llm.has_credentials() {
        tracing::warn!(
            event_name = "system.bootstrap.llm_credentials_missing",
            correlation_id = "bootstrap",
            "no language model api key configured; queries will receive fallback replies"
        );
    }

    Ok(Application { config, db_pool: store.pool, agent_runtime })
}

#[cfg(test)]
mod tests {
    use parley_core::config::{ConfigOverrides, ExchangeBackend, LoadOptions};
    use parley_core::{NewExchange, UserId};

    use crate::bootstrap::bootstrap;

    fn options(overrides: ConfigOverrides) -> LoadOptions {
        LoadOptions {
            config_path: Some("does-not-exist/parley.toml".into()),
            overrides,
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_database_url() {
        let result = bootstrap(options(ConfigOverrides {
            database_backend: Some(ExchangeBackend::Sqlite),
            database_url: Some("postgres://localhost/parley".to_string()),
            ..ConfigOverrides::default()
        }))
        .await;

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("database.url"));
    }

    #[tokio::test]
    async fn bootstrap_with_sqlite_backend_records_through_migrated_store() {
        let app = bootstrap(options(ConfigOverrides {
            database_backend: Some(ExchangeBackend::Sqlite),
            database_url: Some("sqlite::memory:".to_string()),
            ..ConfigOverrides::default()
        }))
        .await
        .expect("bootstrap should succeed");

        assert_eq!(app.agent_runtime.exchange_backend(), "sqlite");
        app.agent_runtime
            .record_exchange(NewExchange {
                user_id: UserId(4),
                query: "hello".to_string(),
                response: "hi".to_string(),
                intent: None,
                metadata: None,
            })
            .await
            .expect("record");
        let listed = app.agent_runtime.list_exchanges(UserId(4), None).await.expect("list");
        assert_eq!(listed.len(), 1);

        if let Some(pool) = app.db_pool {
            pool.close().await;
        }
    }
}
