//! Trial ground: exploration boosts for new arms and culling of failing ones.
//!
//! Every arm enters the trial ground the first time it is seen and receives
//! an additive exploration bonus that decays linearly over its first
//! selections. Independently, arms with enough samples and a success rate
//! below the culling threshold go on a watch list; a periodic sweep removes
//! watched arms that keep failing.
//!
//! ```text
//! new ──> boosted ──(boost spent)──> normal
//!            │                         │
//!            └──(low success rate)──> culling candidate ──> culled
//!                                      │
//!                                      └──(recovered)──> normal
//! ```

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

use crate::domain::models::{
    Config, CullReason, CullRecord, CullingReport, DecisionArm, PathSource, TrialAnalytics,
    TrialConfig, TrialRecord, TrialStatus, WatchEntry,
};

const RECENT_CULLS_REPORTED: usize = 10;

pub struct TrialGroundManager {
    config: TrialConfig,
    boost_rounds: u32,
    culling_threshold: f64,
    culling_min_samples: u64,
    records: HashMap<String, TrialRecord>,
    watch_list: HashMap<String, WatchEntry>,
    culled: VecDeque<CullRecord>,
    total_culled: usize,
}

impl TrialGroundManager {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.trial.clone(),
            boost_rounds: config.exploration_boost_rounds,
            culling_threshold: config.culling_threshold,
            culling_min_samples: config.culling_min_samples,
            records: HashMap::new(),
            watch_list: HashMap::new(),
            culled: VecDeque::new(),
            total_culled: 0,
        }
    }

    /// Start tracking an arm. Returns `false` if it was already tracked.
    pub fn enter_trial(&mut self, arm_id: &str, source: PathSource, now: DateTime<Utc>) -> bool {
        if self.records.contains_key(arm_id) {
            return false;
        }
        self.records.insert(
            arm_id.to_string(),
            TrialRecord::new(arm_id, source, self.boost_rounds, now),
        );
        tracing::info!(arm_id, ?source, boost_rounds = self.boost_rounds, "arm entered trial ground");
        true
    }

    pub fn record(&self, arm_id: &str) -> Option<&TrialRecord> {
        self.records.get(arm_id)
    }

    pub fn is_tracked(&self, arm_id: &str) -> bool {
        self.records.contains_key(arm_id)
    }

    pub fn is_boosted(&self, arm_id: &str) -> bool {
        self.records.get(arm_id).is_some_and(TrialRecord::is_boosted)
    }

    pub fn is_culling_candidate(&self, arm_id: &str) -> bool {
        self.watch_list.contains_key(arm_id)
    }

    pub fn watch_entry(&self, arm_id: &str) -> Option<&WatchEntry> {
        self.watch_list.get(arm_id)
    }

    /// Additive score bonus: the decaying boost plus the permanent bonus
    /// learned arms keep.
    pub fn exploration_bonus(&self, arm_id: &str) -> f64 {
        let Some(record) = self.records.get(arm_id) else {
            return 0.0;
        };
        let permanent = match record.source {
            PathSource::Learned => self.config.learned_path_permanent_bonus,
            PathSource::Static => 0.0,
        };
        record.boost_bonus(self.config.learned_path_bonus) + permanent
    }

    /// Spend one boosted round after a selection. Returns rounds remaining.
    pub fn consume_boost(&mut self, arm_id: &str) -> Option<u32> {
        let record = self.records.get_mut(arm_id)?;
        if !record.is_boosted() {
            return Some(0);
        }
        record.boost_rounds_used += 1;
        let remaining = record.remaining_boost_rounds();
        if remaining == 0 {
            tracing::info!(arm_id, "exploration boost spent, arm enters normal competition");
        } else {
            tracing::debug!(arm_id, remaining, "exploration boost consumed");
        }
        Some(remaining)
    }

    /// Count recorded activations against the boost, so arms that only ever
    /// receive feedback still run out of boosted rounds.
    pub fn sync_boost(&mut self, arm_id: &str, activations: u64) {
        let Some(record) = self.records.get_mut(arm_id) else {
            return;
        };
        let spent = u32::try_from(activations)
            .unwrap_or(u32::MAX)
            .min(record.boost_rounds_total);
        if spent > record.boost_rounds_used {
            record.boost_rounds_used = spent;
            if !record.is_boosted() {
                tracing::info!(arm_id, "exploration boost spent, arm enters normal competition");
            }
        }
    }

    /// Update watch-list membership after an outcome.
    ///
    /// Returns whether the arm is a culling candidate afterwards.
    pub fn observe(&mut self, arm: &DecisionArm, now: DateTime<Utc>) -> bool {
        let rate = arm.success_rate();
        let watched = self.watch_list.contains_key(&arm.arm_id);

        if arm.activation_count() >= self.culling_min_samples && rate < self.culling_threshold {
            if !watched {
                tracing::warn!(
                    arm_id = %arm.arm_id,
                    success_rate = rate,
                    threshold = self.culling_threshold,
                    activations = arm.activation_count(),
                    "arm became a culling candidate"
                );
                self.watch_list.insert(
                    arm.arm_id.clone(),
                    WatchEntry {
                        arm_id: arm.arm_id.clone(),
                        since: now,
                        success_rate_at_entry: rate,
                    },
                );
            }
            return true;
        }

        if watched {
            if self.has_recovered(rate) {
                self.watch_list.remove(&arm.arm_id);
                tracing::info!(arm_id = %arm.arm_id, success_rate = rate, "arm recovered, left watch list");
                return false;
            }
            return true;
        }
        false
    }

    fn has_recovered(&self, rate: f64) -> bool {
        rate >= self.culling_threshold * self.config.recovery_factor
    }

    /// Boost still active, or still inside the window after trial entry.
    pub fn is_protected(&self, arm_id: &str, now: DateTime<Utc>) -> bool {
        self.records.get(arm_id).is_some_and(|record| {
            record.is_boosted()
                || now - record.entered_at < Duration::seconds(self.config.protection_window_secs)
        })
    }

    /// Why a watched arm should be culled at `now`, if it should.
    pub fn cull_reason(&self, arm: &DecisionArm, is_golden: bool, now: DateTime<Utc>) -> Option<CullReason> {
        let entry = self.watch_list.get(&arm.arm_id)?;
        if is_golden || self.is_protected(&arm.arm_id, now) {
            return None;
        }

        let consecutive = arm.consecutive_failures();
        if consecutive >= self.config.max_consecutive_failures {
            return Some(CullReason::ConsecutiveFailures { count: consecutive });
        }

        let rate = arm.success_rate();
        let watched_secs = (now - entry.since).num_seconds();
        if rate < self.culling_threshold * self.config.severe_factor
            && watched_secs > self.config.watch_duration_secs
        {
            return Some(CullReason::SustainedLowPerformance {
                success_rate: rate,
                watched_secs,
            });
        }

        if arm.activation_count() > self.config.max_activations_below_threshold
            && rate < self.culling_threshold
        {
            return Some(CullReason::ExcessiveActivations {
                activations: arm.activation_count(),
                success_rate: rate,
            });
        }
        None
    }

    /// Review every watched arm and cull those past saving.
    ///
    /// Culled arms are dropped from the trial ground; the caller removes
    /// their statistics and parameters.
    pub fn sweep(
        &mut self,
        arms: &HashMap<String, DecisionArm>,
        is_golden: impl Fn(&str) -> bool,
        now: DateTime<Utc>,
    ) -> CullingReport {
        let mut report = CullingReport::default();
        let mut watched: Vec<String> = self.watch_list.keys().cloned().collect();
        watched.sort();

        for arm_id in watched {
            let Some(arm) = arms.get(&arm_id) else {
                self.watch_list.remove(&arm_id);
                continue;
            };
            if self.has_recovered(arm.success_rate()) {
                self.watch_list.remove(&arm_id);
                report.recovered.push(arm_id);
                continue;
            }
            match self.cull_if_due(arm, is_golden(&arm_id), now) {
                Some(record) => report.culled.push(record),
                None => report.spared.push(arm_id),
            }
        }
        tracing::info!(
            culled = report.culled.len(),
            spared = report.spared.len(),
            recovered = report.recovered.len(),
            "culling sweep complete"
        );
        report
    }

    /// Cull one arm now if a cull reason applies.
    ///
    /// The arm leaves the trial ground; the caller removes its statistics
    /// and parameters.
    pub fn cull_if_due(&mut self, arm: &DecisionArm, is_golden: bool, now: DateTime<Utc>) -> Option<CullRecord> {
        let reason = self.cull_reason(arm, is_golden, now)?;
        tracing::warn!(arm_id = %arm.arm_id, ?reason, success_rate = arm.success_rate(), "arm culled");
        let record = CullRecord {
            arm_id: arm.arm_id.clone(),
            reason,
            success_rate: arm.success_rate(),
            activation_count: arm.activation_count(),
            culled_at: now,
        };
        self.forget(&arm.arm_id);
        self.push_culled(record.clone());
        Some(record)
    }

    fn push_culled(&mut self, record: CullRecord) {
        self.total_culled += 1;
        self.culled.push_back(record);
        self.trim_history();
    }

    fn trim_history(&mut self) -> usize {
        let excess = self.culled.len().saturating_sub(self.config.max_culled_history);
        self.culled.drain(..excess);
        excess
    }

    /// Drop all trial state for an arm.
    pub fn forget(&mut self, arm_id: &str) {
        self.records.remove(arm_id);
        self.watch_list.remove(arm_id);
    }

    /// Put an arm back into trial with a fresh boost and clear its watch entry.
    ///
    /// Returns `false` for untracked arms.
    pub fn reset_trial_status(&mut self, arm_id: &str, now: DateTime<Utc>) -> bool {
        let Some(record) = self.records.get_mut(arm_id) else {
            return false;
        };
        record.entered_at = now;
        record.boost_rounds_total = self.boost_rounds;
        record.boost_rounds_used = 0;
        self.watch_list.remove(arm_id);
        tracing::info!(arm_id, "trial status reset");
        true
    }

    /// Drop watch entries for arms no longer present and trim history.
    ///
    /// Returns the number of entries removed.
    pub fn maintenance(&mut self, live_arms: &HashMap<String, DecisionArm>) -> usize {
        let before = self.watch_list.len() + self.records.len();
        self.watch_list.retain(|id, _| live_arms.contains_key(id));
        self.records.retain(|id, _| live_arms.contains_key(id));
        let pruned = before - (self.watch_list.len() + self.records.len());
        pruned + self.trim_history()
    }

    pub fn status(&self, arm_id: &str, is_golden: bool) -> TrialStatus {
        if is_golden {
            return TrialStatus::Golden;
        }
        if self.watch_list.contains_key(arm_id) {
            return TrialStatus::CullingCandidate;
        }
        match self.records.get(arm_id) {
            Some(record) if record.is_boosted() => TrialStatus::Boosted {
                remaining: record.remaining_boost_rounds(),
            },
            Some(_) => TrialStatus::Normal,
            None => TrialStatus::Unknown,
        }
    }

    pub fn culled_history(&self) -> impl Iterator<Item = &CullRecord> {
        self.culled.iter()
    }

    pub fn analytics(&self) -> TrialAnalytics {
        let skip = self.culled.len().saturating_sub(RECENT_CULLS_REPORTED);
        TrialAnalytics {
            tracked_arms: self.records.len(),
            boosted_arms: self.records.values().filter(|r| r.is_boosted()).count(),
            learned_arms: self
                .records
                .values()
                .filter(|r| r.source == PathSource::Learned)
                .count(),
            watch_list: self.watch_list.len(),
            total_culled: self.total_culled,
            recent_culls: self.culled.iter().skip(skip).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arm_with(id: &str, wins: usize, losses: usize, now: DateTime<Utc>) -> DecisionArm {
        let mut arm = DecisionArm::new(id, "t", "", PathSource::Static, now);
        for _ in 0..wins {
            arm.record(true, 1.0, now);
        }
        for _ in 0..losses {
            arm.record(false, 0.0, now);
        }
        arm
    }

    /// Alternate losses and wins so the trailing failure run stays short.
    fn interleaved(id: &str, wins: usize, losses: usize, now: DateTime<Utc>) -> DecisionArm {
        let mut arm = DecisionArm::new(id, "t", "", PathSource::Static, now);
        let mut w = wins;
        for i in 0..(wins + losses) {
            let win = w > 0 && i % ((wins + losses) / wins.max(1)).max(1) == 0;
            if win {
                w -= 1;
            }
            arm.record(win, if win { 1.0 } else { 0.0 }, now);
        }
        arm
    }

    fn exhaust(manager: &mut TrialGroundManager, id: &str) {
        while manager.consume_boost(id).is_some_and(|r| r > 0) {}
    }

    #[test]
    fn test_boost_decays_with_selections() {
        let mut manager = TrialGroundManager::new(&Config::default());
        let now = Utc::now();
        assert!(manager.enter_trial("b", PathSource::Static, now));
        assert!(!manager.enter_trial("b", PathSource::Static, now));
        assert!((manager.exploration_bonus("b") - 0.2).abs() < 1e-12);

        assert_eq!(manager.consume_boost("b"), Some(9));
        assert!((manager.exploration_bonus("b") - 0.18).abs() < 1e-12);
        exhaust(&mut manager, "b");
        assert!(manager.exploration_bonus("b").abs() < f64::EPSILON);
        assert_eq!(manager.status("b", false), TrialStatus::Normal);
        assert_eq!(manager.consume_boost("unknown"), None);
    }

    #[test]
    fn test_learned_arms_keep_permanent_bonus() {
        let mut manager = TrialGroundManager::new(&Config::default());
        manager.enter_trial("learned_x", PathSource::Learned, Utc::now());
        assert!((manager.exploration_bonus("learned_x") - 0.25).abs() < 1e-12);
        exhaust(&mut manager, "learned_x");
        assert!((manager.exploration_bonus("learned_x") - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_watch_list_entry_and_recovery() {
        let mut manager = TrialGroundManager::new(&Config::default());
        let now = Utc::now();
        assert!(!manager.observe(&arm_with("c", 1, 9, now), now));
        assert!(manager.observe(&arm_with("c", 3, 17, now), now));
        assert!(manager.is_culling_candidate("c"));
        // 0.33 is above the threshold but below 1.2x, so still watched.
        assert!(manager.observe(&arm_with("c", 5, 10, now), now));
        assert!(!manager.observe(&arm_with("c", 8, 12, now), now));
        assert!(!manager.is_culling_candidate("c"));
    }

    #[test]
    fn test_sustained_low_performance_culled() {
        let mut manager = TrialGroundManager::new(&Config::default());
        let start = Utc::now();
        manager.enter_trial("c", PathSource::Static, start);
        exhaust(&mut manager, "c");
        let arm = interleaved("c", 2, 18, start);
        assert!(arm.consecutive_failures() < 10);
        assert!(manager.observe(&arm, start));

        let arms = HashMap::from([("c".to_string(), arm)]);
        let report = manager.sweep(&arms, |_| false, start + Duration::hours(2));
        assert_eq!(report.culled.len(), 1);
        assert!(matches!(
            report.culled[0].reason,
            CullReason::SustainedLowPerformance { .. }
        ));
        assert!(!manager.is_tracked("c"));
        assert_eq!(manager.analytics().total_culled, 1);
    }

    #[test]
    fn test_golden_arm_never_culled() {
        let mut manager = TrialGroundManager::new(&Config::default());
        let start = Utc::now();
        manager.enter_trial("g", PathSource::Static, start);
        exhaust(&mut manager, "g");
        let arm = arm_with("g", 2, 18, start);
        manager.observe(&arm, start);

        let arms = HashMap::from([("g".to_string(), arm)]);
        let report = manager.sweep(&arms, |_| true, start + Duration::hours(5));
        assert!(report.culled.is_empty());
        assert_eq!(report.spared, vec!["g".to_string()]);
        assert_eq!(manager.status("g", true), TrialStatus::Golden);
    }

    #[test]
    fn test_protection_window_and_boost_exempt() {
        let mut manager = TrialGroundManager::new(&Config::default());
        let start = Utc::now();
        manager.enter_trial("p", PathSource::Static, start);
        let arm = arm_with("p", 0, 20, start);
        manager.observe(&arm, start);
        assert!(manager.cull_reason(&arm, false, start + Duration::hours(2)).is_none());

        exhaust(&mut manager, "p");
        assert!(manager.cull_reason(&arm, false, start + Duration::minutes(30)).is_none());
        assert!(matches!(
            manager.cull_reason(&arm, false, start + Duration::hours(2)),
            Some(CullReason::ConsecutiveFailures { count: 20 })
        ));
    }

    #[test]
    fn test_excessive_activations_culled() {
        let mut manager = TrialGroundManager::new(&Config::default());
        let start = Utc::now();
        let arm = interleaved("x", 15, 45, start);
        assert!(arm.success_rate() > 0.24 && arm.success_rate() < 0.30);
        manager.observe(&arm, start);
        assert!(matches!(
            manager.cull_reason(&arm, false, start + Duration::seconds(10)),
            Some(CullReason::ExcessiveActivations { activations: 60, .. })
        ));
    }

    #[test]
    fn test_recorded_activations_spend_boost() {
        let mut manager = TrialGroundManager::new(&Config::default());
        let start = Utc::now();
        manager.enter_trial("f", PathSource::Static, start);
        assert_eq!(manager.consume_boost("f"), Some(9));

        manager.sync_boost("f", 1);
        assert_eq!(manager.status("f", false), TrialStatus::Boosted { remaining: 9 });
        manager.sync_boost("f", 4);
        assert_eq!(manager.status("f", false), TrialStatus::Boosted { remaining: 6 });

        let arm = arm_with("f", 0, 60, start);
        manager.sync_boost("f", arm.activation_count());
        manager.observe(&arm, start);
        assert!(matches!(
            manager.cull_reason(&arm, false, start + Duration::hours(2)),
            Some(CullReason::ConsecutiveFailures { count: 60 })
        ));
        manager.sync_boost("untracked", 5);
    }

    #[test]
    fn test_reset_trial_status() {
        let mut manager = TrialGroundManager::new(&Config::default());
        let now = Utc::now();
        manager.enter_trial("r", PathSource::Static, now);
        exhaust(&mut manager, "r");
        manager.observe(&arm_with("r", 0, 20, now), now);
        assert!(manager.reset_trial_status("r", now));
        assert_eq!(manager.status("r", false), TrialStatus::Boosted { remaining: 10 });
        assert!(!manager.reset_trial_status("missing", now));
    }

    #[test]
    fn test_maintenance_prunes_missing_arms() {
        let mut manager = TrialGroundManager::new(&Config::default());
        let now = Utc::now();
        manager.enter_trial("live", PathSource::Static, now);
        manager.enter_trial("gone", PathSource::Static, now);
        let arms = HashMap::from([("live".to_string(), arm_with("live", 1, 0, now))]);
        assert_eq!(manager.maintenance(&arms), 1);
        assert_eq!(manager.analytics().tracked_arms, 1);
    }
}
