use async_trait::async_trait;
use thiserror::Error;

use parley_core::{
    ApplicationError, Exchange, Filter, NewExchange, Record, ResourceKind, UserId,
};

pub mod exchange;
pub mod memory;
pub mod simulation;

pub use exchange::SqlExchangeRepository;
pub use memory::InMemoryExchangeRepository;
pub use simulation::{wrap_list, wrap_record, SimulatedResourceStore};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// Conversation log. Identity and timestamp are assigned by the store on `record`.
#[async_trait]
pub trait ExchangeRepository: Send + Sync {
    async fn record(&self, exchange: NewExchange) -> Result<Exchange, RepositoryError>;

    /// Newest first. `Some(0)` yields an empty list.
    async fn list_for_user(
        &self,
        user_id: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<Exchange>, RepositoryError>;

    async fn clear_for_user(&self, user_id: UserId) -> Result<(), RepositoryError>;

    /// Short label for health and diagnostics output.
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
pub trait ResourceRepository: Send + Sync {
    async fn list(
        &self,
        kind: ResourceKind,
        filters: &[Filter],
    ) -> Result<Vec<Record>, RepositoryError>;

    async fn create(&self, kind: ResourceKind, data: Record) -> Result<Record, RepositoryError>;
}
