use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;

use parley_core::config::{DatabaseConfig, ExchangeBackend};

use crate::migrations;
use crate::repositories::{ExchangeRepository, InMemoryExchangeRepository, SqlExchangeRepository};

pub type DbPool = sqlx::SqlitePool;

#[derive(Debug, Error)]
pub enum StoreOpenError {
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migrate(#[source] sqlx::migrate::MigrateError),
}

/// An opened exchange recorder plus the pool behind it, when the backend has one.
pub struct ExchangeStore {
    pub repository: Arc<dyn ExchangeRepository>,
    pub pool: Option<DbPool>,
}

/// Opens the configured exchange backend. SQLite stores are migrated before use.
pub async fn open_exchange_store(config: &DatabaseConfig) -> Result<ExchangeStore, StoreOpenError> {
    match config.backend {
        ExchangeBackend::Memory => Ok(ExchangeStore {
            repository: Arc::new(InMemoryExchangeRepository::default()),
            pool: None,
        }),
        ExchangeBackend::Sqlite => {
            let pool = connect_for_config(config).await.map_err(StoreOpenError::Connect)?;
            migrations::run_pending(&pool).await.map_err(StoreOpenError::Migrate)?;
            Ok(ExchangeStore {
                repository: Arc::new(SqlExchangeRepository::new(pool.clone())),
                pool: Some(pool),
            })
        }
    }
}

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_for_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Opens a pool and creates the database file when it does not exist yet.
///
/// In-memory databases live only as long as a connection to them, so their pool holds exactly
/// one connection that is never reaped.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool_options = if is_in_memory(database_url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections.max(1))
    };

    pool_options
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
}
