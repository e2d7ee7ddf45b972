//! Golden template registry.
//!
//! Arms that prove themselves (high lifetime success rate, enough samples,
//! recent results in line with the lifetime rate) are memoized as golden
//! templates. When a later round offers a candidate matching a template
//! closely enough, the engine serves it directly without consulting the
//! bandit.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};

use crate::domain::errors::DecisionResult;
use crate::domain::models::{
    Candidate, Config, DecisionArm, GoldenConfig, GoldenTemplate, RevocationReason,
    TemplateEvaluation, TemplateMatch, TemplateStats,
};

const STRATEGY_MATCH_SCORE: f64 = 0.6;
const PATH_TYPE_MATCH_SCORE: f64 = 0.4;
const DESCRIPTION_WEIGHT: f64 = 0.2;
const PERFORMANCE_BASELINE: f64 = 0.8;
const PERFORMANCE_BONUS_CAP: f64 = 0.2;

pub struct GoldenTemplateRegistry {
    config: GoldenConfig,
    success_rate_threshold: f64,
    min_samples: u64,
    capacity: usize,
    templates: BTreeMap<String, GoldenTemplate>,
    promotion_candidates: BTreeSet<String>,
}

impl GoldenTemplateRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.golden.clone(),
            success_rate_threshold: config.golden_success_rate_threshold,
            min_samples: config.golden_min_samples,
            capacity: config.max_golden_templates,
            templates: BTreeMap::new(),
            promotion_candidates: BTreeSet::new(),
        }
    }

    pub fn is_golden(&self, strategy_id: &str) -> bool {
        self.templates.contains_key(strategy_id)
    }

    pub fn get(&self, strategy_id: &str) -> Option<&GoldenTemplate> {
        self.templates.get(strategy_id)
    }

    /// Copy a renamed arm's path type and description onto its template.
    pub fn sync_identity(&mut self, arm: &DecisionArm) {
        if let Some(template) = self.templates.get_mut(&arm.arm_id) {
            template.adopt_identity(arm);
        }
    }

    pub fn templates(&self) -> impl Iterator<Item = &GoldenTemplate> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn promotion_candidates(&self) -> impl Iterator<Item = &String> {
        self.promotion_candidates.iter()
    }

    /// Lifetime rate and sample thresholds, ignoring stability.
    pub fn meets_criteria(&self, arm: &DecisionArm) -> bool {
        arm.success_rate() >= self.success_rate_threshold
            && arm.activation_count() >= self.min_samples
    }

    /// Recent results hold up against the lifetime rate.
    ///
    /// Requires a full stability window; the rate over the most recent
    /// results must reach `stability_ratio` of the lifetime rate.
    pub fn is_stable(&self, arm: &DecisionArm) -> bool {
        let window = self.config.stability_window;
        let recent = arm.recent_results(window);
        if recent.len() < window || window == 0 {
            return false;
        }
        let recent_rate = recent.iter().filter(|s| **s).count() as f64 / recent.len() as f64;
        recent_rate >= arm.success_rate() * self.config.stability_ratio
            && arm.stability_score() >= self.config.min_stability_score
    }

    /// Re-examine an arm after an outcome: promote, refresh, or revoke.
    pub fn evaluate(&mut self, arm: &DecisionArm, now: DateTime<Utc>) -> TemplateEvaluation {
        if let Some(template) = self.templates.get(&arm.arm_id) {
            if let Some(reason) = self.revocation_reason(template, arm) {
                self.revoke(&arm.arm_id, reason.clone());
                return TemplateEvaluation::Revoked(reason);
            }
            if let Some(template) = self.templates.get_mut(&arm.arm_id) {
                template.refresh(arm, now);
            }
            return TemplateEvaluation::Refreshed;
        }

        if !self.meets_criteria(arm) {
            self.promotion_candidates.remove(&arm.arm_id);
            return TemplateEvaluation::NotEligible;
        }
        if !self.is_stable(arm) {
            if self.promotion_candidates.insert(arm.arm_id.clone()) {
                tracing::debug!(arm_id = %arm.arm_id, "arm is a golden template candidate");
            }
            return TemplateEvaluation::Candidate;
        }
        self.promote(GoldenTemplate::from_arm(arm, now), now);
        TemplateEvaluation::Promoted
    }

    fn revocation_reason(&self, template: &GoldenTemplate, arm: &DecisionArm) -> Option<RevocationReason> {
        if arm.consecutive_failures() >= self.config.revoke_after_failures {
            return Some(RevocationReason::RepeatedFailure);
        }
        if !template.forced
            && arm.success_rate() < self.success_rate_threshold - self.config.revoke_margin
        {
            return Some(RevocationReason::PerformanceDegraded);
        }
        None
    }

    /// Insert a template, evicting the lowest-quality one when full.
    ///
    /// Returns the evicted strategy id, if any.
    fn promote(&mut self, template: GoldenTemplate, now: DateTime<Utc>) -> Option<String> {
        let mut evicted = None;
        if self.templates.len() >= self.capacity && !self.templates.contains_key(&template.strategy_id) {
            evicted = self.evict_worst(now);
        }
        tracing::info!(
            strategy_id = %template.strategy_id,
            path_type = %template.path_type,
            success_rate = template.success_rate,
            activations = template.activation_count,
            forced = template.forced,
            templates = self.templates.len() + 1,
            "golden template promoted"
        );
        self.promotion_candidates.remove(&template.strategy_id);
        self.templates.insert(template.strategy_id.clone(), template);
        evicted
    }

    fn evict_worst(&mut self, now: DateTime<Utc>) -> Option<String> {
        let worst = self
            .templates
            .values()
            .min_by(|a, b| a.quality_score(now).total_cmp(&b.quality_score(now)))
            .map(|t| t.strategy_id.clone())?;
        self.revoke(&worst, RevocationReason::Evicted);
        Some(worst)
    }

    /// Promote regardless of thresholds. Returns `false` if already golden.
    pub fn force_promote(&mut self, arm: &DecisionArm, now: DateTime<Utc>) -> bool {
        if self.is_golden(&arm.arm_id) {
            tracing::warn!(arm_id = %arm.arm_id, "already a golden template");
            return false;
        }
        let mut template = GoldenTemplate::from_arm(arm, now);
        template.forced = true;
        self.promote(template, now);
        true
    }

    pub fn revoke(&mut self, strategy_id: &str, reason: RevocationReason) -> Option<GoldenTemplate> {
        let removed = self.templates.remove(strategy_id)?;
        tracing::info!(strategy_id, ?reason, success_rate = removed.success_rate, "golden template revoked");
        Some(removed)
    }

    /// Drop every trace of an arm, e.g. after it was culled.
    pub fn forget(&mut self, strategy_id: &str) {
        self.templates.remove(strategy_id);
        self.promotion_candidates.remove(strategy_id);
    }

    /// Score one template against one candidate.
    ///
    /// `None` when neither the strategy id nor the path type matches.
    pub fn match_score(template: &GoldenTemplate, candidate: &Candidate) -> Option<f64> {
        let base = if template.strategy_id == candidate.strategy_id {
            STRATEGY_MATCH_SCORE
        } else if template.path_type == candidate.path_type {
            PATH_TYPE_MATCH_SCORE
        } else {
            return None;
        };
        let similarity = description_similarity(&template.description, &candidate.description);
        let performance =
            (template.success_rate - PERFORMANCE_BASELINE).clamp(0.0, PERFORMANCE_BONUS_CAP);
        Some((base + DESCRIPTION_WEIGHT * similarity + performance).min(1.0))
    }

    /// Highest-scoring (template, candidate) pair above the match threshold.
    ///
    /// Ties keep the first pair found, iterating templates by strategy id and
    /// candidates in slate order.
    pub fn find_match(&self, candidates: &[Candidate]) -> Option<TemplateMatch> {
        let mut best: Option<TemplateMatch> = None;
        for template in self.templates.values() {
            for candidate in candidates {
                let Some(score) = Self::match_score(template, candidate) else {
                    continue;
                };
                tracing::debug!(
                    template = %template.strategy_id,
                    candidate = %candidate.candidate_id,
                    score,
                    "golden template match score"
                );
                let beats_best = best.as_ref().map_or(true, |b| score > b.score);
                if score > self.config.match_threshold && beats_best {
                    best = Some(TemplateMatch {
                        strategy_id: template.strategy_id.clone(),
                        candidate_id: candidate.candidate_id.clone(),
                        score,
                    });
                }
            }
        }
        best
    }

    /// Count a fast-path selection served by a template.
    pub fn record_usage(&mut self, strategy_id: &str, now: DateTime<Utc>) {
        if let Some(template) = self.templates.get_mut(strategy_id) {
            template.usage_count += 1;
            template.last_used = Some(now);
        }
    }

    pub fn export_templates(&self) -> DecisionResult<String> {
        let templates: Vec<&GoldenTemplate> = self.templates.values().collect();
        Ok(serde_json::to_string_pretty(&templates)?)
    }

    /// Load templates exported by [`export_templates`](Self::export_templates).
    ///
    /// Existing templates with the same id are replaced. Returns the number
    /// imported.
    pub fn import_templates(&mut self, json: &str, now: DateTime<Utc>) -> DecisionResult<usize> {
        let templates: Vec<GoldenTemplate> = serde_json::from_str(json)?;
        let mut seen = HashSet::new();
        let mut imported = 0;
        for template in templates {
            if !seen.insert(template.strategy_id.clone()) {
                continue;
            }
            self.templates.remove(&template.strategy_id);
            self.promote(template, now);
            imported += 1;
        }
        tracing::info!(imported, total = self.templates.len(), "golden templates imported");
        Ok(imported)
    }

    pub fn stats(&self) -> TemplateStats {
        let count = self.templates.len();
        let average_success_rate = if count == 0 {
            0.0
        } else {
            self.templates.values().map(|t| t.success_rate).sum::<f64>() / count as f64
        };
        TemplateStats {
            template_count: count,
            total_usage: self.templates.values().map(|t| t.usage_count).sum(),
            average_success_rate,
            promotion_candidates: self.promotion_candidates.len(),
            oldest: self.templates.values().map(|t| t.created_at).min(),
            newest: self.templates.values().map(|t| t.created_at).max(),
        }
    }
}

/// Jaccard similarity of lowercase whitespace tokens.
pub fn description_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let union = left.union(&right).count();
    left.intersection(&right).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ArmObservation, PathSource};

    fn observations(results: &[bool], now: DateTime<Utc>) -> Vec<ArmObservation> {
        results
            .iter()
            .map(|s| ArmObservation {
                success: *s,
                reward: if *s { 1.0 } else { 0.0 },
                at: now,
            })
            .collect()
    }

    fn recorded(id: &str, path_type: &str, description: &str, results: &[bool]) -> DecisionArm {
        let now = Utc::now();
        let mut arm = DecisionArm::new(id, path_type, description, PathSource::Static, now);
        for ok in results {
            arm.record(*ok, if *ok { 1.0 } else { 0.0 }, now);
        }
        arm
    }

    fn proven(id: &str) -> DecisionArm {
        let mut results = vec![false];
        results.extend([true; 24]);
        recorded(id, "analytical", "step by step analysis", &results)
    }

    #[test]
    fn test_stable_arm_promoted() {
        let mut registry = GoldenTemplateRegistry::new(&Config::default());
        let arm = proven("a");
        assert!((arm.success_rate() - 0.96).abs() < 1e-12);
        assert_eq!(registry.evaluate(&arm, Utc::now()), TemplateEvaluation::Promoted);
        assert!(registry.is_golden("a"));
        assert_eq!(registry.get("a").map(|t| t.activation_count), Some(25));
    }

    #[test]
    fn test_unstable_recent_window_blocks_promotion() {
        let mut registry = GoldenTemplateRegistry::new(&Config::default());
        let now = Utc::now();
        let mut recent = vec![true, true];
        recent.extend([false; 18]);
        // Lifetime 0.95 over 40 samples, but the last 20 are mostly failures.
        let arm = DecisionArm::restore("u", "analytical", 38, 2, 38.0, observations(&recent, now), now);
        assert!(registry.meets_criteria(&arm));
        assert!(!registry.is_stable(&arm));
        assert_eq!(registry.evaluate(&arm, now), TemplateEvaluation::Candidate);
        assert!(!registry.is_golden("u"));
        assert_eq!(registry.stats().promotion_candidates, 1);
    }

    #[test]
    fn test_too_few_samples_not_eligible() {
        let mut registry = GoldenTemplateRegistry::new(&Config::default());
        let arm = recorded("s", "t", "", &[true; 19]);
        assert_eq!(registry.evaluate(&arm, Utc::now()), TemplateEvaluation::NotEligible);
    }

    #[test]
    fn test_repeated_failure_revokes() {
        let mut registry = GoldenTemplateRegistry::new(&Config::default());
        let mut arm = proven("a");
        let now = Utc::now();
        registry.evaluate(&arm, now);
        arm.record(false, 0.0, now);
        arm.record(false, 0.0, now);
        assert_eq!(registry.evaluate(&arm, now), TemplateEvaluation::Refreshed);
        arm.record(false, 0.0, now);
        assert_eq!(
            registry.evaluate(&arm, now),
            TemplateEvaluation::Revoked(RevocationReason::RepeatedFailure)
        );
        assert!(!registry.is_golden("a"));
    }

    #[test]
    fn test_match_scoring() {
        let template = GoldenTemplate::from_arm(&proven("a"), Utc::now());
        let exact = Candidate::new("c1", "analytical", "step by step analysis", "a");
        let score = GoldenTemplateRegistry::match_score(&template, &exact).expect("same id");
        // 0.6 + 0.2 * 1.0 + 0.16
        assert!((score - 0.96).abs() < 1e-9);

        let same_type = Candidate::new("c2", "analytical", "something else", "b");
        let score = GoldenTemplateRegistry::match_score(&template, &same_type).expect("same type");
        assert!((score - 0.56).abs() < 1e-9);

        let unrelated = Candidate::new("c3", "creative", "step by step analysis", "z");
        assert!(GoldenTemplateRegistry::match_score(&template, &unrelated).is_none());
    }

    #[test]
    fn test_find_match_requires_threshold() {
        let mut registry = GoldenTemplateRegistry::new(&Config::default());
        registry.evaluate(&proven("a"), Utc::now());
        let slate = vec![
            Candidate::new("c2", "analytical", "step by step analysis", "b"),
            Candidate::new("c1", "analytical", "step by step analysis", "a"),
        ];
        let found = registry.find_match(&slate).expect("match");
        assert_eq!(found.candidate_id, "c1");
        assert_eq!(found.strategy_id, "a");

        let weak = vec![Candidate::new("c1", "analytical", "unrelated words", "a")];
        assert!(registry.find_match(&weak).is_none());
    }

    #[test]
    fn test_capacity_evicts_lowest_quality() {
        let config = Config {
            max_golden_templates: 2,
            ..Config::default()
        };
        let mut registry = GoldenTemplateRegistry::new(&config);
        let now = Utc::now();
        registry.evaluate(&proven("a"), now);
        registry.evaluate(&proven("b"), now);
        registry.record_usage("b", now);
        registry.evaluate(&proven("c"), now);
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_golden("a"));
        assert!(registry.is_golden("b") && registry.is_golden("c"));
    }

    #[test]
    fn test_force_promote_and_manual_revoke() {
        let mut registry = GoldenTemplateRegistry::new(&Config::default());
        let weak = recorded("w", "t", "", &[true, false, false]);
        let now = Utc::now();
        assert!(registry.force_promote(&weak, now));
        assert!(!registry.force_promote(&weak, now));
        assert_eq!(registry.evaluate(&weak, now), TemplateEvaluation::Refreshed);
        assert!(registry.revoke("w", RevocationReason::Manual).is_some());
        assert!(registry.revoke("w", RevocationReason::Manual).is_none());
    }

    #[test]
    fn test_export_import() {
        let mut registry = GoldenTemplateRegistry::new(&Config::default());
        let now = Utc::now();
        registry.evaluate(&proven("a"), now);
        registry.record_usage("a", now);
        let json = registry.export_templates().expect("export");

        let mut restored = GoldenTemplateRegistry::new(&Config::default());
        assert_eq!(restored.import_templates(&json, now).expect("import"), 1);
        assert_eq!(restored.get("a"), registry.get("a"));
        assert!(restored.import_templates("not json", now).is_err());

        let stats = restored.stats();
        assert_eq!(stats.template_count, 1);
        assert_eq!(stats.total_usage, 1);
    }

    #[test]
    fn test_description_similarity() {
        assert!((description_similarity("A b c", "a B d") - 0.5).abs() < 1e-12);
        assert!(description_similarity("", "a").abs() < f64::EPSILON);
    }
}
