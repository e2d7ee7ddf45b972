//! In-process adapters for embedding the engine without external services.

pub mod parameter_store;
pub mod tool_registry;

pub use parameter_store::InMemoryParameterStore;
pub use tool_registry::StaticToolRegistry;
