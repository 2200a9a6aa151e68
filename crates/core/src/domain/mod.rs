pub mod connection;
pub mod exchange;
pub mod interpretation;
pub mod resource;
