//! Execution outcomes and the canonical reward function.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::features::FeatureVector;

/// Rewards at or above this value count as a success in arm statistics.
pub const SUCCESS_REWARD_THRESHOLD: f64 = 0.5;

/// Component signals of an execution outcome, each in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessMetric {
    ContractSuccess,
    ExecutionSuccess,
    UserSatisfaction,
    CostEfficiency,
    TimeEfficiency,
}

impl SuccessMetric {
    pub const ALL: [Self; 5] = [
        Self::ContractSuccess,
        Self::ExecutionSuccess,
        Self::UserSatisfaction,
        Self::CostEfficiency,
        Self::TimeEfficiency,
    ];

    /// Fixed weight of this metric in the reward. Weights sum to 1.
    pub const fn weight(self) -> f64 {
        match self {
            Self::ContractSuccess => 0.4,
            Self::ExecutionSuccess => 0.3,
            Self::UserSatisfaction => 0.2,
            Self::CostEfficiency | Self::TimeEfficiency => 0.05,
        }
    }
}

/// Immutable record of one executed candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub arm_id: String,
    pub context: FeatureVector,
    pub metrics: BTreeMap<SuccessMetric, f64>,
    pub execution_time_secs: f64,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
    /// Contract approved for this execution, released when the outcome is
    /// recorded.
    pub contract_id: Option<String>,
}

impl ActionOutcome {
    pub fn new(arm_id: impl Into<String>, context: FeatureVector) -> Self {
        Self {
            arm_id: arm_id.into(),
            context,
            metrics: BTreeMap::new(),
            execution_time_secs: 0.0,
            cost: 0.0,
            timestamp: Utc::now(),
            contract_id: None,
        }
    }

    #[must_use]
    pub fn with_metric(mut self, metric: SuccessMetric, value: f64) -> Self {
        self.metrics.insert(metric, value);
        self
    }

    #[must_use]
    pub fn with_execution(mut self, execution_time_secs: f64, cost: f64) -> Self {
        self.execution_time_secs = execution_time_secs;
        self.cost = cost;
        self
    }

    #[must_use]
    pub fn with_contract(mut self, contract_id: impl Into<String>) -> Self {
        self.contract_id = Some(contract_id.into());
        self
    }

    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Outcome where every metric scored `value`.
    pub fn uniform(arm_id: impl Into<String>, context: FeatureVector, value: f64) -> Self {
        SuccessMetric::ALL
            .iter()
            .fold(Self::new(arm_id, context), |o, m| o.with_metric(*m, value))
    }

    /// Weighted reward in `[0.0, 1.0]`.
    ///
    /// Metrics are clamped to `[0, 1]`; missing or non-finite metrics
    /// contribute nothing.
    pub fn reward(&self) -> f64 {
        SuccessMetric::ALL
            .iter()
            .map(|metric| {
                let value = self
                    .metrics
                    .get(metric)
                    .copied()
                    .filter(|v| v.is_finite())
                    .unwrap_or(0.0)
                    .clamp(0.0, 1.0);
                metric.weight() * value
            })
            .sum()
    }

    pub fn is_success(&self) -> bool {
        self.reward() >= SUCCESS_REWARD_THRESHOLD
    }
}
