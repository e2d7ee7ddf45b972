//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty stdout output
//! - Rolling file output via tracing-appender
//! - Retention cleanup of rotated files

pub mod logger;

pub use logger::{cleanup_old_logs, LogFormat, LoggerImpl, RotationPolicy, LOG_FILE_PREFIX};
