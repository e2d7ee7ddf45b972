use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::domain::models::LoggingConfig;

/// File name prefix of every log file the logger writes.
pub const LOG_FILE_PREFIX: &str = "strategos.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Stdout output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(format: &str) -> Result<Self> {
        match format.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => anyhow::bail!("Invalid log format: {format}"),
        }
    }
}

/// Rotation policy for file output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPolicy {
    Daily,
    Hourly,
    Never,
}

impl RotationPolicy {
    pub fn parse(rotation: &str) -> Result<Self> {
        match rotation.to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "hourly" => Ok(Self::Hourly),
            "never" => Ok(Self::Never),
            _ => anyhow::bail!("Invalid log rotation: {rotation}"),
        }
    }
}

/// Logger implementation using tracing
pub struct LoggerImpl {
    _guard: Option<WorkerGuard>,
}

impl LoggerImpl {
    /// Install the global subscriber described by `config`.
    ///
    /// The returned logger owns the non-blocking writer's guard; dropping it
    /// flushes and stops file output.
    ///
    /// # Errors
    /// Returns an error for an invalid level, format or rotation, or when a
    /// global subscriber is already installed.
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let default_level = parse_log_level(&config.level)?;
        let format = LogFormat::parse(&config.format)?;
        let rotation = RotationPolicy::parse(&config.rotation)?;

        let env_filter = EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy();

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if let Some(ref log_dir) = config.log_dir {
            let file_appender = match rotation {
                RotationPolicy::Daily => rolling::daily(log_dir, LOG_FILE_PREFIX),
                RotationPolicy::Hourly => rolling::hourly(log_dir, LOG_FILE_PREFIX),
                RotationPolicy::Never => rolling::never(log_dir, LOG_FILE_PREFIX),
            };
            let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(file_guard);

            // Files are always JSON for structured ingestion
            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking_file)
                    .with_ansi(false)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_filter(env_filter.clone())
                    .boxed(),
            );
        }

        if config.log_dir.is_none() || config.enable_stdout {
            layers.push(stdout_layer(format, env_filter));
        }

        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .context("failed to install global tracing subscriber")?;

        tracing::info!(
            level = %config.level,
            format = ?format,
            file_output = config.log_dir.is_some(),
            "logger initialized"
        );

        Ok(Self { _guard: guard })
    }

    pub fn has_file_output(&self) -> bool {
        self._guard.is_some()
    }
}

fn stdout_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer {
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stdout)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(io::stdout)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(filter)
            .boxed(),
    }
}

/// Parse log level string to Level
fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("Invalid log level: {level}"),
    }
}

/// Delete rotated log files last modified more than `retention_days` before
/// `now`.
///
/// Only files whose name starts with [`LOG_FILE_PREFIX`] are considered.
/// Returns the number of files deleted.
pub async fn cleanup_old_logs(
    log_dir: impl AsRef<Path>,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<usize> {
    let log_dir = log_dir.as_ref();
    if !tokio::fs::try_exists(log_dir).await.unwrap_or(false) {
        tracing::warn!(path = %log_dir.display(), "log directory does not exist");
        return Ok(0);
    }

    let cutoff = now - Duration::days(i64::from(retention_days));
    let mut deleted = 0;
    let mut entries = tokio::fs::read_dir(log_dir)
        .await
        .context("failed to read log directory")?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .context("failed to read directory entry")?
    {
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }

        let modified: DateTime<Utc> = entry
            .metadata()
            .await
            .context("failed to get file metadata")?
            .modified()
            .context("failed to get file modification time")?
            .into();

        if modified < cutoff {
            tokio::fs::remove_file(&path)
                .await
                .context("failed to delete old log file")?;
            tracing::info!(path = %path.display(), "deleted old log file");
            deleted += 1;
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("trace"), Ok(Level::TRACE)));
        assert!(matches!(parse_log_level("debug"), Ok(Level::DEBUG)));
        assert!(matches!(parse_log_level("info"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("warn"), Ok(Level::WARN)));
        assert!(matches!(parse_log_level("error"), Ok(Level::ERROR)));
        assert!(matches!(parse_log_level("TRACE"), Ok(Level::TRACE)));
        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_parse_format_and_rotation() {
        assert_eq!(LogFormat::parse("JSON").ok(), Some(LogFormat::Json));
        assert!(LogFormat::parse("xml").is_err());
        assert_eq!(RotationPolicy::parse("hourly").ok(), Some(RotationPolicy::Hourly));
        assert!(RotationPolicy::parse("weekly").is_err());
    }

    #[test]
    fn test_logger_installs_once() {
        let config = LoggingConfig {
            format: "pretty".to_string(),
            ..LoggingConfig::default()
        };
        let first = LoggerImpl::init(&config);
        let second = LoggerImpl::init(&config);
        assert!(second.is_err());
        drop(first);
    }

    #[test]
    fn test_logger_rejects_bad_level() {
        let config = LoggingConfig {
            level: "loud".to_string(),
            ..LoggingConfig::default()
        };
        assert!(LoggerImpl::init(&config).is_err());
    }

    #[tokio::test]
    async fn test_cleanup_old_logs() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("strategos.log.2026-01-01"), "old").expect("write");
        std::fs::write(dir.path().join("notes.txt"), "keep").expect("write");

        let now = Utc::now();
        assert_eq!(cleanup_old_logs(dir.path(), 30, now).await.expect("cleanup"), 0);

        let later = now + Duration::days(2);
        assert_eq!(cleanup_old_logs(dir.path(), 1, later).await.expect("cleanup"), 1);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_cleanup_missing_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent");
        assert_eq!(cleanup_old_logs(&missing, 1, Utc::now()).await.expect("cleanup"), 0);
    }
}
