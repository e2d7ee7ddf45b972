//! Trial-ground bookkeeping records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::arm::PathSource;

/// Per-arm trial state: when it entered, and how much of its exploration
/// boost it has consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub arm_id: String,
    pub source: PathSource,
    pub entered_at: DateTime<Utc>,
    pub boost_rounds_total: u32,
    pub boost_rounds_used: u32,
}

impl TrialRecord {
    pub fn new(
        arm_id: impl Into<String>,
        source: PathSource,
        boost_rounds: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            arm_id: arm_id.into(),
            source,
            entered_at: now,
            boost_rounds_total: boost_rounds,
            boost_rounds_used: 0,
        }
    }

    pub const fn remaining_boost_rounds(&self) -> u32 {
        self.boost_rounds_total.saturating_sub(self.boost_rounds_used)
    }

    pub const fn is_boosted(&self) -> bool {
        self.remaining_boost_rounds() > 0
    }

    /// Linearly decaying share of `bonus` still owed to this arm.
    pub fn boost_bonus(&self, bonus: f64) -> f64 {
        if self.boost_rounds_total == 0 {
            return 0.0;
        }
        bonus * f64::from(self.remaining_boost_rounds()) / f64::from(self.boost_rounds_total)
    }
}

/// An arm on the culling watch list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub arm_id: String,
    pub since: DateTime<Utc>,
    pub success_rate_at_entry: f64,
}

/// Why an arm was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CullReason {
    ConsecutiveFailures { count: usize },
    SustainedLowPerformance { success_rate: f64, watched_secs: i64 },
    ExcessiveActivations { activations: u64, success_rate: f64 },
}

/// Audit entry for one culled arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CullRecord {
    pub arm_id: String,
    pub reason: CullReason,
    pub success_rate: f64,
    pub activation_count: u64,
    pub culled_at: DateTime<Utc>,
}

/// Reporting view of where an arm sits in the trial lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Boosted { remaining: u32 },
    Normal,
    CullingCandidate,
    Golden,
    Unknown,
}

/// Snapshot returned by trial-ground analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrialAnalytics {
    pub tracked_arms: usize,
    pub boosted_arms: usize,
    pub learned_arms: usize,
    pub watch_list: usize,
    pub total_culled: usize,
    pub recent_culls: Vec<CullRecord>,
}

/// Outcome of a culling sweep.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CullingReport {
    pub culled: Vec<CullRecord>,
    /// Watched arms left alone because they are golden or protected.
    pub spared: Vec<String>,
    /// Arms taken off the watch list after recovering.
    pub recovered: Vec<String>,
}
