//! Per-strategy outcome statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of observations retained per arm.
pub const MAX_ARM_HISTORY: usize = 100;

/// Minimum activations before a stability score is meaningful.
const STABILITY_MIN_ACTIVATIONS: u64 = 10;
const STABILITY_LOOKBACK: usize = 20;
const STABILITY_WINDOW: usize = 5;

/// Id prefixes the planner uses for strategies it synthesized at runtime.
const LEARNED_PREFIXES: [&str; 3] = ["learned_", "explored_", "generated_"];

/// Where a strategy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PathSource {
    /// Synthesized or discovered at runtime by the planner.
    Learned,
    /// Part of the planner's fixed strategy catalogue.
    #[default]
    Static,
}

impl PathSource {
    /// Classify a strategy by its id, unless the planner already flagged it.
    pub fn detect(strategy_id: &str, flagged_learned: bool) -> Self {
        if flagged_learned
            || LEARNED_PREFIXES
                .iter()
                .any(|prefix| strategy_id.starts_with(prefix))
        {
            Self::Learned
        } else {
            Self::Static
        }
    }
}

/// One feedback observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmObservation {
    pub success: bool,
    pub reward: f64,
    pub at: DateTime<Utc>,
}

/// Outcome statistics for one candidate strategy.
///
/// `activation_count` is always `success_count + failure_count`; it is
/// derived rather than stored so the two can never drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionArm {
    pub arm_id: String,
    pub path_type: String,
    pub description: String,
    pub source: PathSource,
    success_count: u64,
    failure_count: u64,
    total_reward: f64,
    history: VecDeque<ArmObservation>,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl DecisionArm {
    pub fn new(
        arm_id: impl Into<String>,
        path_type: impl Into<String>,
        description: impl Into<String>,
        source: PathSource,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            arm_id: arm_id.into(),
            path_type: path_type.into(),
            description: description.into(),
            source,
            success_count: 0,
            failure_count: 0,
            total_reward: 0.0,
            history: VecDeque::with_capacity(MAX_ARM_HISTORY),
            created_at: now,
            last_used: None,
        }
    }

    /// Rebuild an arm from previously exported counters.
    ///
    /// `history` is ordered oldest first; only the newest
    /// [`MAX_ARM_HISTORY`] entries are kept.
    pub fn restore(
        arm_id: impl Into<String>,
        path_type: impl Into<String>,
        success_count: u64,
        failure_count: u64,
        total_reward: f64,
        history: Vec<ArmObservation>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let skip = history.len().saturating_sub(MAX_ARM_HISTORY);
        let history: VecDeque<_> = history.into_iter().skip(skip).collect();
        let last_used = history.back().map(|o| o.at);
        Self {
            arm_id: arm_id.into(),
            path_type: path_type.into(),
            description: String::new(),
            source: PathSource::Static,
            success_count,
            failure_count,
            total_reward,
            history,
            created_at,
            last_used,
        }
    }

    /// Apply one feedback observation. This is the only mutation path for
    /// the counters.
    pub fn record(&mut self, success: bool, reward: f64, at: DateTime<Utc>) {
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.total_reward += reward;
        if self.history.len() == MAX_ARM_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(ArmObservation {
            success,
            reward,
            at,
        });
        self.last_used = Some(at);
    }

    pub const fn success_count(&self) -> u64 {
        self.success_count
    }

    pub const fn failure_count(&self) -> u64 {
        self.failure_count
    }

    pub const fn activation_count(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub const fn total_reward(&self) -> f64 {
        self.total_reward
    }

    /// Lifetime success rate; 0.5 before the first activation.
    pub fn success_rate(&self) -> f64 {
        match self.activation_count() {
            0 => 0.5,
            n => self.success_count as f64 / n as f64,
        }
    }

    pub fn average_reward(&self) -> f64 {
        match self.activation_count() {
            0 => 0.0,
            n => self.total_reward / n as f64,
        }
    }

    /// Retained observations, oldest first.
    pub fn history(&self) -> impl DoubleEndedIterator<Item = &ArmObservation> + ExactSizeIterator {
        self.history.iter()
    }

    /// Up to `n` most recent success flags, oldest first.
    pub fn recent_results(&self, n: usize) -> Vec<bool> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).map(|o| o.success).collect()
    }

    /// Success rate over the `n` most recent observations, if any exist.
    pub fn recent_success_rate(&self, n: usize) -> Option<f64> {
        let recent = self.recent_results(n);
        if recent.is_empty() {
            return None;
        }
        let wins = recent.iter().filter(|s| **s).count();
        Some(wins as f64 / recent.len() as f64)
    }

    /// Length of the current trailing run of failures.
    pub fn consecutive_failures(&self) -> usize {
        self.history.iter().rev().take_while(|o| !o.success).count()
    }

    /// Length of the current trailing run of successes.
    pub fn consecutive_successes(&self) -> usize {
        self.history.iter().rev().take_while(|o| o.success).count()
    }

    /// Consistency of recent results in `[0.0, 1.0]`.
    ///
    /// Slides a 5-result window over the last 20 results and maps the
    /// variance of the window success rates to `1 - 4 * variance`. Arms
    /// with fewer than 10 activations score 0; too little retained history
    /// to form two windows scores a neutral 0.5.
    pub fn stability_score(&self) -> f64 {
        if self.activation_count() < STABILITY_MIN_ACTIVATIONS {
            return 0.0;
        }
        let recent = self.recent_results(STABILITY_LOOKBACK);
        if recent.len() < STABILITY_WINDOW {
            return 0.5;
        }
        let rates: Vec<f64> = recent
            .windows(STABILITY_WINDOW)
            .map(|w| w.iter().filter(|s| **s).count() as f64 / STABILITY_WINDOW as f64)
            .collect();
        if rates.len() < 2 {
            return 0.5;
        }
        let mean = rates.iter().sum::<f64>() / rates.len() as f64;
        let variance = rates.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / rates.len() as f64;
        (1.0 - 4.0 * variance).max(0.0)
    }

    /// Blended confidence in this strategy, in `[0.0, 1.0]`.
    pub fn confidence(&self) -> f64 {
        let sample_base = match self.activation_count() {
            0..=4 => 0.2,
            5..=9 => 0.4,
            10..=19 => 0.6,
            _ => 0.8,
        };
        let recent = self.recent_success_rate(5).unwrap_or(0.5);
        let score = 0.3 * sample_base
            + 0.4 * self.success_rate()
            + 0.2 * self.stability_score()
            + 0.1 * recent;
        score.clamp(0.0, 1.0)
    }
}
