//! Parameter store port for bandit persistence.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::errors::DecisionResult;
use crate::domain::models::FeatureVector;

/// Named binary parameters of one arm, e.g. `"A"`, `"b"`, `"theta"`.
pub type ParameterSet = BTreeMap<String, Vec<u8>>;

// ---------------------------------------------------------------------------
// OutcomeRecord
// ---------------------------------------------------------------------------

/// One row of the append-only outcome log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub arm_id: String,
    /// Hex SHA-256 of the serialized feature map. Analytics only.
    pub context_hash: String,
    /// Serialized feature map, keyed by slot name.
    pub context_features: String,
    pub reward: f64,
    pub execution_time: f64,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn new(
        arm_id: impl Into<String>,
        context: &FeatureVector,
        reward: f64,
        execution_time: f64,
        cost: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let context_features = serde_json::to_string(&context.named()).unwrap_or_default();
        Self {
            arm_id: arm_id.into(),
            context_hash: context_hash(&context_features),
            context_features,
            reward,
            execution_time,
            cost,
            timestamp,
        }
    }
}

/// Deterministic hash of a serialized feature map.
///
/// The map is serialized from a `BTreeMap`, so keys are already sorted and
/// equal contexts hash equally.
pub fn context_hash(serialized_features: &str) -> String {
    hex::encode(Sha256::digest(serialized_features.as_bytes()))
}

// ---------------------------------------------------------------------------
// ParameterStore
// ---------------------------------------------------------------------------

/// Keyed blob store for per-arm bandit parameters plus an outcome log.
///
/// Parameters are addressed by `(algorithm, arm_id, parameter_name)`.
/// Every write is an idempotent upsert.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Upsert all named parameters for one arm.
    async fn save(&self, algorithm: &str, arm_id: &str, params: &ParameterSet) -> DecisionResult<()>;

    /// Load the parameters for one arm. Unknown arms yield an empty set.
    async fn load(&self, algorithm: &str, arm_id: &str) -> DecisionResult<ParameterSet>;

    /// Remove every parameter stored for one arm.
    async fn delete(&self, algorithm: &str, arm_id: &str) -> DecisionResult<()>;

    /// Append one executed outcome to the log.
    async fn append_outcome(&self, record: &OutcomeRecord) -> DecisionResult<()>;

    /// Most recent outcomes for an arm, newest first.
    async fn recent_outcomes(&self, arm_id: &str, limit: usize) -> DecisionResult<Vec<OutcomeRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_hash_is_deterministic() {
        let now = Utc::now();
        let a = OutcomeRecord::new("x", &FeatureVector::neutral(), 1.0, 0.0, 0.0, now);
        let b = OutcomeRecord::new("y", &FeatureVector::neutral(), 0.0, 3.0, 1.0, now);
        assert_eq!(a.context_hash, b.context_hash);
        assert_eq!(a.context_hash.len(), 64);

        let other = FeatureVector::new([0.1; 8]);
        let c = OutcomeRecord::new("x", &other, 1.0, 0.0, 0.0, now);
        assert_ne!(a.context_hash, c.context_hash);
    }

    #[test]
    fn test_context_hash_is_lowercase_sha256_hex() {
        assert_eq!(
            context_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
