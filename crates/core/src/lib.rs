//! Domain model for the Parley voice CRM assistant.
//!
//! Everything here is deterministic and I/O free: interpretation records produced from the
//! language model, connection credentials, recorded exchanges, CRM resource kinds and the filter
//! semantics of the simulated CRM, plus configuration and the error taxonomy shared by the
//! runtime crates.

pub mod config;
pub mod domain;
pub mod errors;

pub use domain::connection::{ConnectionContext, SIMULATION_API_URL};
pub use domain::exchange::{Exchange, ExchangeId, NewExchange, UserId};
pub use domain::interpretation::{ActionDirective, FallbackReason, Interpretation, Resolved};
pub use domain::resource::{Filter, FilterOperator, Record, ResourceKind};
pub use errors::{ApplicationError, DomainError, InterfaceError};
