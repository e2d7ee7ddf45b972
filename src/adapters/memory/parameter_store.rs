//! In-memory parameter store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::DecisionResult;
use crate::domain::ports::{OutcomeRecord, ParameterSet, ParameterStore};

/// [`ParameterStore`] kept entirely in process memory.
///
/// Suitable for embedding without a database and for tests; contents are
/// lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryParameterStore {
    params: RwLock<HashMap<(String, String), ParameterSet>>,
    outcomes: RwLock<Vec<OutcomeRecord>>,
}

impl InMemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outcomes appended so far.
    pub async fn outcome_count(&self) -> usize {
        self.outcomes.read().await.len()
    }
}

#[async_trait]
impl ParameterStore for InMemoryParameterStore {
    async fn save(&self, algorithm: &str, arm_id: &str, params: &ParameterSet) -> DecisionResult<()> {
        let mut guard = self.params.write().await;
        let entry = guard
            .entry((algorithm.to_string(), arm_id.to_string()))
            .or_default();
        for (name, value) in params {
            entry.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    async fn load(&self, algorithm: &str, arm_id: &str) -> DecisionResult<ParameterSet> {
        Ok(self
            .params
            .read()
            .await
            .get(&(algorithm.to_string(), arm_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, algorithm: &str, arm_id: &str) -> DecisionResult<()> {
        self.params
            .write()
            .await
            .remove(&(algorithm.to_string(), arm_id.to_string()));
        Ok(())
    }

    async fn append_outcome(&self, record: &OutcomeRecord) -> DecisionResult<()> {
        self.outcomes.write().await.push(record.clone());
        Ok(())
    }

    async fn recent_outcomes(&self, arm_id: &str, limit: usize) -> DecisionResult<Vec<OutcomeRecord>> {
        Ok(self
            .outcomes
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| r.arm_id == arm_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
