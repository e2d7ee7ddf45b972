//! Tool preconditions: registration, argument schemas, and cached health.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonschema::{Draft, JSONSchema};

use crate::domain::errors::{DecisionError, DecisionResult};
use crate::domain::ports::{ToolHealth, ToolRegistry};

#[derive(Debug, Clone)]
struct CachedHealth {
    health: ToolHealth,
    checked_at: DateTime<Utc>,
}

/// Checks a contract's tool against the registry.
///
/// Health probe results are cached per tool for a fixed TTL; a stale entry
/// forces a fresh probe. Failed probes are cached as unhealthy.
pub struct PreconditionChecker {
    registry: Arc<dyn ToolRegistry>,
    ttl: Duration,
    health_cache: HashMap<String, CachedHealth>,
}

impl PreconditionChecker {
    pub fn new(registry: Arc<dyn ToolRegistry>, ttl_secs: i64) -> Self {
        Self {
            registry,
            ttl: Duration::seconds(ttl_secs.max(0)),
            health_cache: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<dyn ToolRegistry> {
        &self.registry
    }

    pub async fn tool_exists(&self, tool: &str) -> DecisionResult<bool> {
        self.registry.has_tool(tool).await
    }

    /// Validate `arguments` against the tool's declared schema.
    ///
    /// Returns the list of violations, empty when the arguments conform or
    /// the tool declares no schema. A schema that does not compile is an
    /// error rather than a violation.
    pub async fn validate_arguments(
        &self,
        tool: &str,
        arguments: &serde_json::Value,
    ) -> DecisionResult<Vec<String>> {
        let Some(schema) = self.registry.get_schema(tool).await? else {
            tracing::debug!(tool, "no argument schema declared, skipping check");
            return Ok(Vec::new());
        };

        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
            .map_err(|e| DecisionError::Registry(format!("schema for {tool} does not compile: {e}")))?;

        let violations = match compiled.validate(arguments) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| format!("{}: {}", e.instance_path, e))
                .collect(),
        };
        Ok(violations)
    }

    /// Probe health, served from cache while the last probe is fresh.
    pub async fn check_tool_health(&mut self, tool: &str, now: DateTime<Utc>) -> ToolHealth {
        if let Some(cached) = self.cached_health(tool, now) {
            return cached.clone();
        }

        let health = match self.registry.health_check(tool).await {
            Ok(health) => health,
            Err(e) => {
                tracing::warn!(tool, error = %e, "health probe failed, treating tool as unhealthy");
                ToolHealth::unhealthy(e.to_string())
            }
        };
        if !health.healthy {
            tracing::info!(tool, error = ?health.error, "tool reported unhealthy");
        }
        self.health_cache.insert(
            tool.to_string(),
            CachedHealth {
                health: health.clone(),
                checked_at: now,
            },
        );
        health
    }

    /// Cached probe result, if still within the TTL at `now`.
    pub fn cached_health(&self, tool: &str, now: DateTime<Utc>) -> Option<&ToolHealth> {
        self.health_cache
            .get(tool)
            .filter(|c| now - c.checked_at < self.ttl)
            .map(|c| &c.health)
    }

    pub fn invalidate(&mut self, tool: &str) {
        self.health_cache.remove(tool);
    }

    pub fn clear_cache(&mut self) {
        self.health_cache.clear();
    }

    /// File-resource precondition.
    pub async fn check_file_exists(&self, path: impl AsRef<Path>) -> bool {
        tokio::fs::try_exists(path.as_ref()).await.unwrap_or(false)
    }
}
