//! Bandit plus persistence.
//!
//! Wraps the configured [`ContextualBandit`] with a [`ParameterStore`]:
//! parameters are loaded the first time an arm is referenced and written back
//! after every fit. Storage failures never abort a decision; the arm simply
//! starts from its prior.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::models::{BanditAlgorithmKind, Config, FeatureVector};
use crate::domain::ports::ParameterStore;

use super::bandit::{BanditAlgorithm, BanditPrediction, ContextualBandit, FitOutcome};

/// Selection and reward statistics for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BanditStats {
    pub algorithm: Option<BanditAlgorithmKind>,
    pub total_selections: u64,
    pub total_fits: u64,
    pub skipped_fits: u64,
    pub selection_counts: BTreeMap<String, u64>,
    pub mean_recent_reward: f64,
}

pub struct BanditManager {
    bandit: ContextualBandit,
    store: Arc<dyn ParameterStore>,
    hydrated: HashSet<String>,
    selection_counts: BTreeMap<String, u64>,
    total_selections: u64,
    total_fits: u64,
    skipped_fits: u64,
    recent_rewards: VecDeque<f64>,
    recent_window: usize,
}

impl BanditManager {
    pub fn new(config: &Config, store: Arc<dyn ParameterStore>) -> Self {
        Self::with_bandit(
            ContextualBandit::from_config(config),
            store,
            config.bandit.recent_reward_window,
        )
    }

    pub fn with_bandit(
        bandit: ContextualBandit,
        store: Arc<dyn ParameterStore>,
        recent_window: usize,
    ) -> Self {
        Self {
            bandit,
            store,
            hydrated: HashSet::new(),
            selection_counts: BTreeMap::new(),
            total_selections: 0,
            total_fits: 0,
            skipped_fits: 0,
            recent_rewards: VecDeque::with_capacity(recent_window),
            recent_window,
        }
    }

    pub const fn bandit(&self) -> &ContextualBandit {
        &self.bandit
    }

    pub fn algorithm(&self) -> BanditAlgorithmKind {
        self.bandit.kind()
    }

    /// Load stored parameters for arms not yet seen by this process.
    pub async fn hydrate(&mut self, arm_ids: &[String]) {
        let algorithm = self.bandit.kind().as_str();
        for arm_id in arm_ids {
            if self.hydrated.contains(arm_id) {
                continue;
            }
            self.hydrated.insert(arm_id.clone());
            if self.bandit.has_arm(arm_id) {
                continue;
            }
            match self.store.load(algorithm, arm_id).await {
                Ok(params) if params.is_empty() => {}
                Ok(params) => {
                    if let Err(e) = self.bandit.import_arm(arm_id, &params) {
                        tracing::warn!(
                            arm_id = %arm_id,
                            error = %e,
                            "stored bandit parameters unusable, starting from prior"
                        );
                    } else {
                        tracing::debug!(arm_id = %arm_id, "bandit parameters restored");
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        arm_id = %arm_id,
                        error = %e,
                        "failed to load bandit parameters, starting from prior"
                    );
                }
            }
        }
    }

    pub async fn predict(
        &mut self,
        context: &FeatureVector,
        candidates: &[String],
    ) -> Option<BanditPrediction> {
        self.hydrate(candidates).await;
        self.bandit.predict(context.as_slice(), candidates)
    }

    pub fn record_selection(&mut self, arm_id: &str) {
        *self.selection_counts.entry(arm_id.to_string()).or_insert(0) += 1;
        self.total_selections += 1;
    }

    /// Fit one reward and persist the arm's updated parameters.
    pub async fn fit(&mut self, context: &FeatureVector, arm_id: &str, reward: f64) -> FitOutcome {
        self.hydrate(&[arm_id.to_string()]).await;
        let outcome = self.bandit.fit(context.as_slice(), arm_id, reward);
        self.total_fits += 1;
        if self.recent_window > 0 {
            if self.recent_rewards.len() == self.recent_window {
                self.recent_rewards.pop_front();
            }
            self.recent_rewards.push_back(reward);
        }
        match outcome {
            FitOutcome::Updated => self.persist(arm_id).await,
            FitOutcome::SkippedSingular => self.skipped_fits += 1,
        }
        outcome
    }

    async fn persist(&self, arm_id: &str) {
        let Some(params) = self.bandit.export_arm(arm_id) else {
            return;
        };
        if let Err(e) = self
            .store
            .save(self.bandit.kind().as_str(), arm_id, &params)
            .await
        {
            tracing::warn!(arm_id, error = %e, "failed to persist bandit parameters");
        }
    }

    /// Drop an arm's parameters from memory and storage.
    pub async fn forget(&mut self, arm_id: &str) {
        self.bandit.remove_arm(arm_id);
        self.hydrated.remove(arm_id);
        self.selection_counts.remove(arm_id);
        if let Err(e) = self.store.delete(self.bandit.kind().as_str(), arm_id).await {
            tracing::warn!(arm_id, error = %e, "failed to delete bandit parameters");
        }
    }

    pub fn usage_count(&self, arm_id: &str) -> u64 {
        self.selection_counts.get(arm_id).copied().unwrap_or(0)
    }

    pub fn usage_counts<'a>(&self, arm_ids: impl IntoIterator<Item = &'a String>) -> BTreeMap<String, u64> {
        arm_ids
            .into_iter()
            .map(|id| (id.clone(), self.usage_count(id)))
            .collect()
    }

    pub fn stats(&self) -> BanditStats {
        let mean_recent_reward = if self.recent_rewards.is_empty() {
            0.0
        } else {
            self.recent_rewards.iter().sum::<f64>() / self.recent_rewards.len() as f64
        };
        BanditStats {
            algorithm: Some(self.bandit.kind()),
            total_selections: self.total_selections,
            total_fits: self.total_fits,
            skipped_fits: self.skipped_fits,
            selection_counts: self.selection_counts.clone(),
            mean_recent_reward,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryParameterStore;
    use crate::domain::errors::{DecisionError, DecisionResult};
    use crate::domain::ports::{OutcomeRecord, ParameterSet};
    use async_trait::async_trait;

    struct FailingStore;

    #[async_trait]
    impl ParameterStore for FailingStore {
        async fn save(&self, _: &str, _: &str, _: &ParameterSet) -> DecisionResult<()> {
            Err(DecisionError::Persistence("disk full".to_string()))
        }
        async fn load(&self, _: &str, _: &str) -> DecisionResult<ParameterSet> {
            Err(DecisionError::Persistence("disk gone".to_string()))
        }
        async fn delete(&self, _: &str, _: &str) -> DecisionResult<()> {
            Err(DecisionError::Persistence("disk gone".to_string()))
        }
        async fn append_outcome(&self, _: &OutcomeRecord) -> DecisionResult<()> {
            Err(DecisionError::Persistence("disk gone".to_string()))
        }
        async fn recent_outcomes(&self, _: &str, _: usize) -> DecisionResult<Vec<OutcomeRecord>> {
            Err(DecisionError::Persistence("disk gone".to_string()))
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_fit_persists_and_new_manager_restores() {
        let store: Arc<dyn ParameterStore> = Arc::new(InMemoryParameterStore::new());
        let config = Config::default();
        let ctx = FeatureVector::new([0.2; 8]);

        let mut first = BanditManager::new(&config, Arc::clone(&store));
        first.fit(&ctx, "a", 1.0).await;
        let exported = first.bandit().export_arm("a").expect("fitted");

        let mut second = BanditManager::new(&config, store);
        second.hydrate(&ids(&["a"])).await;
        assert_eq!(second.bandit().export_arm("a"), Some(exported));
    }

    #[tokio::test]
    async fn test_storage_failure_is_cold_start() {
        let mut manager = BanditManager::new(&Config::default(), Arc::new(FailingStore));
        let ctx = FeatureVector::neutral();
        let prediction = manager.predict(&ctx, &ids(&["a", "b"])).await.expect("scores");
        assert_eq!(prediction.best_id, "a");
        assert_eq!(manager.fit(&ctx, "a", 1.0).await, FitOutcome::Updated);
        manager.forget("a").await;
        assert!(!manager.bandit().has_arm("a"));
    }

    #[tokio::test]
    async fn test_selection_stats() {
        let mut manager = BanditManager::new(&Config::default(), Arc::new(InMemoryParameterStore::new()));
        manager.record_selection("a");
        manager.record_selection("a");
        manager.record_selection("b");
        manager.fit(&FeatureVector::neutral(), "a", 1.0).await;
        manager.fit(&FeatureVector::neutral(), "b", 0.0).await;

        let stats = manager.stats();
        assert_eq!(stats.total_selections, 3);
        assert_eq!(stats.selection_counts["a"], 2);
        assert!((stats.mean_recent_reward - 0.5).abs() < 1e-12);
        assert_eq!(manager.usage_count("missing"), 0);
    }
}
