//! Golden templates: memoized, consistently successful strategies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::arm::DecisionArm;

/// Hours of inactivity during which recency stays at 1.0.
const RECENCY_FRESH_HOURS: f64 = 24.0;
/// Hours of inactivity at which recency reaches 0.0.
const RECENCY_STALE_HOURS: f64 = 168.0;
/// Usage count at which the usage component of quality saturates.
const USAGE_SATURATION: f64 = 10.0;

/// A strategy promoted to fast-path status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenTemplate {
    pub strategy_id: String,
    pub path_type: String,
    pub description: String,
    pub success_rate: f64,
    pub activation_count: u64,
    pub average_reward: f64,
    pub stability_score: f64,
    /// Times this template was served as a fast-path decision.
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    /// Promoted manually rather than by meeting the thresholds.
    #[serde(default)]
    pub forced: bool,
}

impl GoldenTemplate {
    /// Snapshot an arm's statistics as a new template.
    pub fn from_arm(arm: &DecisionArm, now: DateTime<Utc>) -> Self {
        Self {
            strategy_id: arm.arm_id.clone(),
            path_type: arm.path_type.clone(),
            description: arm.description.clone(),
            success_rate: arm.success_rate(),
            activation_count: arm.activation_count(),
            average_reward: arm.average_reward(),
            stability_score: arm.stability_score(),
            usage_count: 0,
            created_at: now,
            updated_at: now,
            last_used: None,
            forced: false,
        }
    }

    /// Copy the latest arm statistics into the template.
    pub fn refresh(&mut self, arm: &DecisionArm, now: DateTime<Utc>) {
        self.success_rate = arm.success_rate();
        self.activation_count = arm.activation_count();
        self.average_reward = arm.average_reward();
        self.stability_score = arm.stability_score();
        self.adopt_identity(arm);
        self.updated_at = now;
    }

    /// Take over the arm's path type and, when set, its description.
    pub fn adopt_identity(&mut self, arm: &DecisionArm) {
        self.path_type.clone_from(&arm.path_type);
        if !arm.description.is_empty() {
            self.description.clone_from(&arm.description);
        }
    }

    /// 1.0 when used within a day, falling linearly to 0.0 after a week.
    pub fn recency_score(&self, now: DateTime<Utc>) -> f64 {
        let reference = self.last_used.unwrap_or(self.created_at);
        let hours = (now - reference).num_seconds().max(0) as f64 / 3600.0;
        if hours <= RECENCY_FRESH_HOURS {
            1.0
        } else if hours >= RECENCY_STALE_HOURS {
            0.0
        } else {
            1.0 - (hours - RECENCY_FRESH_HOURS) / (RECENCY_STALE_HOURS - RECENCY_FRESH_HOURS)
        }
    }

    /// Retention score used to pick an eviction victim.
    pub fn quality_score(&self, now: DateTime<Utc>) -> f64 {
        let usage = (self.usage_count as f64 / USAGE_SATURATION).min(1.0);
        0.4 * self.success_rate + 0.3 * usage + 0.2 * self.stability_score + 0.1 * self.recency_score(now)
    }
}

/// Aggregate view over the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TemplateStats {
    pub template_count: usize,
    pub total_usage: u64,
    pub average_success_rate: f64,
    pub promotion_candidates: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Why a template left the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    Manual,
    RepeatedFailure,
    PerformanceDegraded,
    Evicted,
}

/// Result of re-evaluating one arm against the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateEvaluation {
    Promoted,
    /// Already golden; statistics refreshed.
    Refreshed,
    /// Meets rate and sample thresholds but not the stability check yet.
    Candidate,
    Revoked(RevocationReason),
    NotEligible,
}

/// Best template/candidate pairing found during matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMatch {
    pub strategy_id: String,
    pub candidate_id: String,
    pub score: f64,
}
