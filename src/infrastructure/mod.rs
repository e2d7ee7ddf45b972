//! Infrastructure layer module
//!
//! - Configuration management (figment: defaults, YAML files, environment)
//! - Logging infrastructure (tracing, rolling files, retention cleanup)

pub mod config;
pub mod logging;
