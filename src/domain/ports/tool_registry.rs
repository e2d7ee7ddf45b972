//! Tool registry port: the external catalogue of executable tools.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DecisionResult;

/// Result of one health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolHealth {
    pub healthy: bool,
    pub latency_ms: Option<f64>,
    pub error: Option<String>,
}

impl ToolHealth {
    pub const fn healthy(latency_ms: f64) -> Self {
        Self {
            healthy: true,
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency_ms: None,
            error: Some(error.into()),
        }
    }
}

/// Registry of tools a candidate may invoke.
///
/// The engine never executes tools; it only asks whether they exist, what
/// arguments they accept, and whether they are currently healthy. Callers
/// are expected to bound the latency of these calls themselves.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Whether a tool with this name is registered.
    async fn has_tool(&self, name: &str) -> DecisionResult<bool>;

    /// JSON schema for the tool's arguments, if it declares one.
    async fn get_schema(&self, name: &str) -> DecisionResult<Option<serde_json::Value>>;

    /// Probe the tool's health.
    async fn health_check(&self, name: &str) -> DecisionResult<ToolHealth>;
}
