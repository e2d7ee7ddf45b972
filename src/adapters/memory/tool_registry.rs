//! Static, in-process tool registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::DecisionResult;
use crate::domain::ports::{ToolHealth, ToolRegistry};

#[derive(Debug, Clone)]
struct ToolEntry {
    schema: Option<serde_json::Value>,
    health: ToolHealth,
}

/// [`ToolRegistry`] backed by a fixed table of tools whose health is set
/// by the host.
#[derive(Debug, Default)]
pub struct StaticToolRegistry {
    tools: RwLock<HashMap<String, ToolEntry>>,
    probes: AtomicUsize,
}

impl StaticToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a healthy tool.
    pub async fn register(&self, name: impl Into<String>, schema: Option<serde_json::Value>) {
        self.tools.write().await.insert(
            name.into(),
            ToolEntry {
                schema,
                health: ToolHealth::healthy(1.0),
            },
        );
    }

    /// Overwrite a registered tool's health. Unknown tools are ignored.
    pub async fn set_health(&self, name: &str, health: ToolHealth) {
        if let Some(entry) = self.tools.write().await.get_mut(name) {
            entry.health = health;
        }
    }

    /// Number of health probes served.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ToolRegistry for StaticToolRegistry {
    async fn has_tool(&self, name: &str) -> DecisionResult<bool> {
        Ok(self.tools.read().await.contains_key(name))
    }

    async fn get_schema(&self, name: &str) -> DecisionResult<Option<serde_json::Value>> {
        Ok(self
            .tools
            .read()
            .await
            .get(name)
            .and_then(|entry| entry.schema.clone()))
    }

    async fn health_check(&self, name: &str) -> DecisionResult<ToolHealth> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .tools
            .read()
            .await
            .get(name)
            .map_or_else(|| ToolHealth::unhealthy("tool not registered"), |entry| entry.health.clone()))
    }
}
