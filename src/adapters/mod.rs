//! Adapters implementing the domain ports.
//!
//! - `sqlite`: durable parameter store backed by sqlx
//! - `memory`: in-process parameter store and tool registry

pub mod memory;
pub mod sqlite;

pub use memory::{InMemoryParameterStore, StaticToolRegistry};
pub use sqlite::SqliteParameterStore;
