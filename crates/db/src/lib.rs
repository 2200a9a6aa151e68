pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{
    connect, connect_for_config, connect_with_settings, open_exchange_store, DbPool, ExchangeStore,
    StoreOpenError,
};
pub use repositories::{
    ExchangeRepository, InMemoryExchangeRepository, RepositoryError, ResourceRepository,
    SimulatedResourceStore, SqlExchangeRepository,
};
