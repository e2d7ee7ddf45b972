//! Contextual decision engine.
//!
//! One decision round runs:
//!
//! 1. **Extract** features from the task text and environment (never fails).
//! 2. **Match** the slate against golden templates; a gated match is served
//!    immediately without consulting the bandit.
//! 3. **Gate** every candidate through the verified reasoning gate. Rejected
//!    candidates are dropped for this round and fitted with a zero reward.
//! 4. **Select** with the bandit plus trial-ground exploration bonuses, and
//!    approve the winner's contract so its budget stays reserved.
//!
//! Feedback flows back through [`ContextualDecisionEngine::record_outcome`],
//! which updates the bandit, arm statistics, golden templates and the trial
//! ground, and closes the contract.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::domain::errors::{DecisionError, DecisionResult};
use crate::domain::models::{
    ActionOutcome, BanditAlgorithmKind, Candidate, CandidateRejection, CandidateScore, Config,
    ContractViolation, CullRecord, CullingReport, DecisionArm, DecisionOutcome, DecisionRequest, ExtractedContext,
    FeedbackReport, PathSource, RejectionReport, RevocationReason, Selection, SelectionInfo,
    SelectionMethod, TemplateEvaluation, TemplateStats, TrialAnalytics, TrialStatus,
};
use crate::domain::ports::{OutcomeRecord, ParameterStore, TaskClassifier, ToolRegistry};

use super::bandit_manager::{BanditManager, BanditStats};
use super::budget_ledger::ResourceUsage;
use super::feature_extractor::ContextFeatureExtractor;
use super::golden_templates::GoldenTemplateRegistry;
use super::trial_ground::TrialGroundManager;
use super::verified_reasoning::{CandidateVerification, GateStats, VerifiedReasoningGate};

/// Path type given to arms first seen through feedback rather than a slate.
const UNKNOWN_PATH_TYPE: &str = "unknown";

// ============================================================================
// State and reports
// ============================================================================

/// Mutable per-arm statistics owned by one engine.
#[derive(Debug, Default)]
pub struct DecisionEngineState {
    pub arms: HashMap<String, DecisionArm>,
    pub rounds: u64,
    pub rejected_rounds: u64,
}

/// Result of a maintenance pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaintenanceReport {
    pub culling: CullingReport,
    /// Stale trial entries and culled-history records pruned.
    pub pruned: usize,
}

/// Aggregate view across every component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    pub arms: usize,
    pub rounds: u64,
    pub rejected_rounds: u64,
    pub bandit: BanditStats,
    pub gate: GateStats,
    pub templates: TemplateStats,
    pub trial: TrialAnalytics,
    pub budget: Vec<ResourceUsage>,
}

// ============================================================================
// ContextualDecisionEngine
// ============================================================================

pub struct ContextualDecisionEngine {
    extractor: ContextFeatureExtractor,
    bandits: BanditManager,
    gate: VerifiedReasoningGate,
    trial: TrialGroundManager,
    golden: GoldenTemplateRegistry,
    store: Arc<dyn ParameterStore>,
    state: DecisionEngineState,
}

impl ContextualDecisionEngine {
    pub fn new(
        config: &Config,
        store: Arc<dyn ParameterStore>,
        registry: Arc<dyn ToolRegistry>,
    ) -> Self {
        tracing::info!(
            algorithm = config.algorithm.as_str(),
            feature_dim = config.feature_dim,
            "decision engine initialized"
        );
        Self {
            extractor: ContextFeatureExtractor::new(),
            bandits: BanditManager::new(config, Arc::clone(&store)),
            gate: VerifiedReasoningGate::new(registry, config),
            trial: TrialGroundManager::new(config),
            golden: GoldenTemplateRegistry::new(config),
            store,
            state: DecisionEngineState::default(),
        }
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn TaskClassifier>) -> Self {
        self.extractor = ContextFeatureExtractor::with_classifier(classifier);
        self
    }

    pub fn arm(&self, arm_id: &str) -> Option<&DecisionArm> {
        self.state.arms.get(arm_id)
    }

    pub fn arms(&self) -> impl Iterator<Item = &DecisionArm> {
        self.state.arms.values()
    }

    pub const fn gate(&self) -> &VerifiedReasoningGate {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut VerifiedReasoningGate {
        &mut self.gate
    }

    pub const fn trial_ground(&self) -> &TrialGroundManager {
        &self.trial
    }

    pub const fn golden_templates(&self) -> &GoldenTemplateRegistry {
        &self.golden
    }

    pub const fn bandits(&self) -> &BanditManager {
        &self.bandits
    }

    // ------------------------------------------------------------------------
    // Decision round
    // ------------------------------------------------------------------------

    /// Choose one candidate, or explain why none is feasible.
    pub async fn decide(&mut self, request: &DecisionRequest, now: DateTime<Utc>) -> DecisionOutcome {
        self.state.rounds += 1;
        let candidates = dedupe_candidates(&request.candidates);
        if candidates.is_empty() {
            tracing::warn!("decision requested with no candidates");
            self.state.rejected_rounds += 1;
            return DecisionOutcome::Rejected(RejectionReport {
                reason: DecisionError::NoCandidates.to_string(),
                rejections: Vec::new(),
            });
        }

        let context = self
            .extractor
            .extract(&request.task, &request.environment, &request.available_tools, now)
            .await;
        for candidate in &candidates {
            self.ensure_arm(candidate, now);
        }

        let mut verified: HashMap<String, CandidateVerification> = HashMap::new();
        if let Some(template) = self.golden.find_match(&candidates) {
            if let Some(candidate) = candidates.iter().find(|c| c.candidate_id == template.candidate_id) {
                let verification = self.verify(candidate, now).await;
                if verification.passed() {
                    match self.approve(&verification, now) {
                        Ok(contract_id) => {
                            self.golden.record_usage(&template.strategy_id, now);
                            tracing::info!(
                                candidate_id = %candidate.candidate_id,
                                template = %template.strategy_id,
                                score = template.score,
                                "golden template served"
                            );
                            let info = SelectionInfo {
                                method: SelectionMethod::GoldenTemplate,
                                scores: Vec::new(),
                                usage_counts: self.bandits.usage_counts(candidates.iter().map(|c| &c.strategy_id)),
                                template_score: Some(template.score),
                                feature_degraded: context.degraded.is_some(),
                                validation: Some(verification.summary()),
                            };
                            return DecisionOutcome::Selected(Selection {
                                candidate_id: candidate.candidate_id.clone(),
                                strategy_id: candidate.strategy_id.clone(),
                                confidence: template.score.clamp(0.0, 1.0),
                                context: context.vector,
                                contract_id,
                                info,
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "golden template contract not approved, falling back");
                        }
                    }
                } else {
                    tracing::info!(
                        candidate_id = %candidate.candidate_id,
                        "golden template failed verification, falling back to bandit"
                    );
                }
                verified.insert(candidate.candidate_id.clone(), verification);
            }
        }

        let mut feasible: Vec<(&Candidate, CandidateVerification)> = Vec::new();
        let mut rejections = Vec::new();
        for candidate in &candidates {
            let verification = match verified.remove(&candidate.candidate_id) {
                Some(v) => v,
                None => self.verify(candidate, now).await,
            };
            if verification.passed() {
                feasible.push((candidate, verification));
            } else {
                self.penalize_rejected(&context, candidate, &verification).await;
                rejections.push(CandidateRejection {
                    candidate_id: candidate.candidate_id.clone(),
                    strategy_id: candidate.strategy_id.clone(),
                    violations: verification.violations(),
                });
            }
        }

        self.select(&candidates, feasible, rejections, context, now).await
    }

    async fn select(
        &mut self,
        candidates: &[Candidate],
        feasible: Vec<(&Candidate, CandidateVerification)>,
        mut rejections: Vec<CandidateRejection>,
        context: ExtractedContext,
        now: DateTime<Utc>,
    ) -> DecisionOutcome {
        let arm_ids: Vec<String> = feasible.iter().map(|(c, _)| c.strategy_id.clone()).collect();
        let bandit_scores: HashMap<String, f64> = self
            .bandits
            .predict(&context.vector, &arm_ids)
            .await
            .map(|p| p.scores.into_iter().collect())
            .unwrap_or_default();

        let scores: Vec<CandidateScore> = arm_ids
            .iter()
            .map(|id| {
                let bandit_score = bandit_scores.get(id).copied().unwrap_or(0.0);
                let exploration_bonus = self.trial.exploration_bonus(id);
                CandidateScore {
                    strategy_id: id.clone(),
                    bandit_score,
                    exploration_bonus,
                    total: bandit_score + exploration_bonus,
                }
            })
            .collect();
        for score in &scores {
            tracing::debug!(
                arm_id = %score.strategy_id,
                bandit = score.bandit_score,
                bonus = score.exploration_bonus,
                total = score.total,
                "candidate scored"
            );
        }

        // Stable sort keeps slate order among equal totals.
        let mut ranked: Vec<usize> = (0..feasible.len()).collect();
        ranked.sort_by(|a, b| {
            let (a, b) = (finite_or_min(scores[*a].total), finite_or_min(scores[*b].total));
            b.total_cmp(&a)
        });

        for idx in ranked {
            let (candidate, verification) = &feasible[idx];
            match self.approve(verification, now) {
                Ok(contract_id) => {
                    self.bandits.record_selection(&candidate.strategy_id);
                    self.trial.consume_boost(&candidate.strategy_id);
                    let confidence = self
                        .state
                        .arms
                        .get(&candidate.strategy_id)
                        .map_or(0.0, DecisionArm::confidence);
                    tracing::info!(
                        candidate_id = %candidate.candidate_id,
                        arm_id = %candidate.strategy_id,
                        score = scores[idx].total,
                        confidence,
                        "candidate selected"
                    );
                    let info = SelectionInfo {
                        method: self.bandit_method(),
                        scores,
                        usage_counts: self.bandits.usage_counts(candidates.iter().map(|c| &c.strategy_id)),
                        template_score: None,
                        feature_degraded: context.degraded.is_some(),
                        validation: Some(verification.summary()),
                    };
                    return DecisionOutcome::Selected(Selection {
                        candidate_id: candidate.candidate_id.clone(),
                        strategy_id: candidate.strategy_id.clone(),
                        confidence,
                        context: context.vector,
                        contract_id,
                        info,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        candidate_id = %candidate.candidate_id,
                        error = %e,
                        "contract approval failed, trying next candidate"
                    );
                    let violations = match e {
                        DecisionError::BudgetExceeded {
                            resource,
                            requested,
                            available,
                        } => vec![ContractViolation::BudgetExceeded {
                            resource,
                            requested,
                            available,
                        }],
                        _ => Vec::new(),
                    };
                    self.penalize_rejected(&context, candidate, verification).await;
                    rejections.push(CandidateRejection {
                        candidate_id: candidate.candidate_id.clone(),
                        strategy_id: candidate.strategy_id.clone(),
                        violations,
                    });
                }
            }
        }

        self.state.rejected_rounds += 1;
        let reason = DecisionError::AllCandidatesRejected(candidates.len()).to_string();
        tracing::warn!(candidates = candidates.len(), "no feasible candidate");
        DecisionOutcome::Rejected(RejectionReport { reason, rejections })
    }

    fn bandit_method(&self) -> SelectionMethod {
        match self.bandits.algorithm() {
            BanditAlgorithmKind::Linucb => SelectionMethod::Linucb,
            BanditAlgorithmKind::Thompson => SelectionMethod::Thompson,
        }
    }

    async fn verify(&mut self, candidate: &Candidate, now: DateTime<Utc>) -> CandidateVerification {
        let arm = self.state.arms.get(&candidate.strategy_id);
        self.gate.validate_candidate(candidate, arm, now).await
    }

    fn approve(&mut self, verification: &CandidateVerification, now: DateTime<Utc>) -> DecisionResult<String> {
        let contract = verification
            .chain
            .contracts
            .first()
            .cloned()
            .ok_or_else(|| DecisionError::UnknownContract(verification.chain.chain_id.clone()))?;
        self.gate.approve(contract, now)
    }

    /// Negative bandit feedback for a gated-out candidate. Arm statistics
    /// are left alone: the strategy never ran.
    async fn penalize_rejected(
        &mut self,
        context: &ExtractedContext,
        candidate: &Candidate,
        verification: &CandidateVerification,
    ) {
        tracing::info!(
            candidate_id = %candidate.candidate_id,
            arm_id = %candidate.strategy_id,
            violations = ?verification.violations(),
            "candidate rejected by verification"
        );
        self.bandits.fit(&context.vector, &candidate.strategy_id, 0.0).await;
    }

    fn ensure_arm(&mut self, candidate: &Candidate, now: DateTime<Utc>) {
        if let Some(arm) = self.state.arms.get_mut(&candidate.strategy_id) {
            // Arms first seen through feedback learn their identity from the slate.
            let mut changed = false;
            if arm.path_type == UNKNOWN_PATH_TYPE && candidate.path_type != UNKNOWN_PATH_TYPE {
                arm.path_type.clone_from(&candidate.path_type);
                changed = true;
            }
            if arm.description.is_empty() && !candidate.description.is_empty() {
                arm.description.clone_from(&candidate.description);
                changed = true;
            }
            if changed {
                tracing::debug!(
                    arm_id = %candidate.strategy_id,
                    path_type = %arm.path_type,
                    "arm identity filled from slate"
                );
                self.golden.sync_identity(arm);
            }
            return;
        }
        let source = PathSource::detect(&candidate.strategy_id, candidate.learned);
        let arm = DecisionArm::new(
            candidate.strategy_id.clone(),
            candidate.path_type.clone(),
            candidate.description.clone(),
            source,
            now,
        );
        tracing::debug!(arm_id = %candidate.strategy_id, ?source, "arm created");
        self.state.arms.insert(candidate.strategy_id.clone(), arm);
        self.trial.enter_trial(&candidate.strategy_id, source, now);
    }

    // ------------------------------------------------------------------------
    // Feedback
    // ------------------------------------------------------------------------

    /// Learn from an executed candidate.
    pub async fn record_outcome(&mut self, outcome: &ActionOutcome) -> FeedbackReport {
        let now = outcome.timestamp;
        let arm_id = outcome.arm_id.clone();
        let reward = outcome.reward();
        let success = outcome.is_success();

        if !self.state.arms.contains_key(&arm_id) {
            tracing::warn!(error = %DecisionError::UnknownArm(arm_id.clone()), "creating arm from feedback");
            let source = PathSource::detect(&arm_id, false);
            self.state.arms.insert(
                arm_id.clone(),
                DecisionArm::new(arm_id.clone(), UNKNOWN_PATH_TYPE, "", source, now),
            );
            self.trial.enter_trial(&arm_id, source, now);
        }

        self.bandits.fit(&outcome.context, &arm_id, reward).await;
        let record = OutcomeRecord::new(
            arm_id.clone(),
            &outcome.context,
            reward,
            outcome.execution_time_secs,
            outcome.cost,
            now,
        );
        if let Err(e) = self.store.append_outcome(&record).await {
            tracing::warn!(arm_id = %arm_id, error = %e, "failed to append outcome log");
        }

        if let Some(contract_id) = &outcome.contract_id {
            if let Err(e) = self.gate.complete(contract_id, success) {
                tracing::warn!(contract_id = %contract_id, error = %e, "could not close contract");
            }
        }

        let mut report = FeedbackReport {
            arm_id: arm_id.clone(),
            reward,
            success,
            ..FeedbackReport::default()
        };
        let Some(arm) = self.state.arms.get_mut(&arm_id) else {
            return report;
        };
        arm.record(success, reward, now);
        self.trial.sync_boost(&arm_id, arm.activation_count());
        tracing::debug!(
            arm_id = %arm_id,
            reward,
            success,
            success_rate = arm.success_rate(),
            activations = arm.activation_count(),
            "outcome recorded"
        );

        match self.golden.evaluate(arm, now) {
            TemplateEvaluation::Promoted => report.promoted = true,
            TemplateEvaluation::Revoked(reason) => report.revoked = Some(reason),
            TemplateEvaluation::Refreshed
            | TemplateEvaluation::Candidate
            | TemplateEvaluation::NotEligible => {}
        }
        report.culling_candidate = self.trial.observe(arm, now);

        if report.culling_candidate {
            let is_golden = self.golden.is_golden(&arm_id);
            if let Some(record) = self.trial.cull_if_due(arm, is_golden, now) {
                self.remove_arm(&record).await;
                report.culled = true;
            }
        }
        report
    }

    /// Abandon a selection without an outcome, releasing its budget.
    pub fn cancel(&mut self, contract_id: &str) -> bool {
        self.gate.cancel(contract_id)
    }

    async fn remove_arm(&mut self, record: &CullRecord) {
        self.state.arms.remove(&record.arm_id);
        self.golden.forget(&record.arm_id);
        self.bandits.forget(&record.arm_id).await;
    }

    // ------------------------------------------------------------------------
    // Maintenance and management
    // ------------------------------------------------------------------------

    /// Culling sweep over the watch list followed by trial-ground cleanup.
    pub async fn run_maintenance(&mut self, now: DateTime<Utc>) -> MaintenanceReport {
        let golden = &self.golden;
        let culling = self
            .trial
            .sweep(&self.state.arms, |id| golden.is_golden(id), now);
        for record in &culling.culled {
            self.remove_arm(record).await;
        }
        let pruned = self.trial.maintenance(&self.state.arms);
        MaintenanceReport { culling, pruned }
    }

    /// Load previously learned statistics for an arm.
    ///
    /// The arm replaces any existing one with the same id and is evaluated
    /// for promotion and culling straight away. It does not enter the trial
    /// ground, so it gets no exploration boost.
    pub fn register_arm(&mut self, arm: DecisionArm, now: DateTime<Utc>) -> TemplateEvaluation {
        let evaluation = self.golden.evaluate(&arm, now);
        self.trial.observe(&arm, now);
        tracing::info!(arm_id = %arm.arm_id, activations = arm.activation_count(), ?evaluation, "arm registered");
        self.state.arms.insert(arm.arm_id.clone(), arm);
        evaluation
    }

    pub fn reset_trial_status(&mut self, arm_id: &str, now: DateTime<Utc>) -> bool {
        self.trial.reset_trial_status(arm_id, now)
    }

    pub fn trial_status(&self, arm_id: &str) -> TrialStatus {
        self.trial.status(arm_id, self.golden.is_golden(arm_id))
    }

    pub fn trial_analytics(&self) -> TrialAnalytics {
        self.trial.analytics()
    }

    /// Promote an arm regardless of thresholds.
    pub fn force_promote(&mut self, arm_id: &str, now: DateTime<Utc>) -> DecisionResult<bool> {
        let arm = self
            .state
            .arms
            .get(arm_id)
            .ok_or_else(|| DecisionError::UnknownArm(arm_id.to_string()))?;
        Ok(self.golden.force_promote(arm, now))
    }

    pub fn revoke_template(&mut self, strategy_id: &str) -> bool {
        self.golden
            .revoke(strategy_id, RevocationReason::Manual)
            .is_some()
    }

    pub fn export_templates(&self) -> DecisionResult<String> {
        self.golden.export_templates()
    }

    pub fn import_templates(&mut self, json: &str, now: DateTime<Utc>) -> DecisionResult<usize> {
        self.golden.import_templates(json, now)
    }

    pub fn template_stats(&self) -> TemplateStats {
        self.golden.stats()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            arms: self.state.arms.len(),
            rounds: self.state.rounds,
            rejected_rounds: self.state.rejected_rounds,
            bandit: self.bandits.stats(),
            gate: self.gate.stats().clone(),
            templates: self.golden.stats(),
            trial: self.trial.analytics(),
            budget: self.gate.ledger().snapshot(),
        }
    }
}

/// Keep the first candidate per strategy id.
fn dedupe_candidates(candidates: &[Candidate]) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter(|c| {
            let fresh = seen.insert(c.strategy_id.clone());
            if !fresh {
                tracing::debug!(candidate_id = %c.candidate_id, strategy_id = %c.strategy_id, "duplicate strategy dropped");
            }
            fresh
        })
        .cloned()
        .collect()
}

fn finite_or_min(score: f64) -> f64 {
    if score.is_finite() {
        score
    } else {
        f64::NEG_INFINITY
    }
}

// ============================================================================
// DecisionSession
// ============================================================================

/// Shares one engine between tasks.
///
/// Every call holds the session lock for its full duration, so selections
/// and feedback are applied one at a time in arrival order.
#[derive(Clone)]
pub struct DecisionSession {
    engine: Arc<Mutex<ContextualDecisionEngine>>,
}

impl DecisionSession {
    pub fn new(engine: ContextualDecisionEngine) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    pub async fn decide(&self, request: &DecisionRequest) -> DecisionOutcome {
        self.engine.lock().await.decide(request, Utc::now()).await
    }

    pub async fn record_outcome(&self, outcome: &ActionOutcome) -> FeedbackReport {
        self.engine.lock().await.record_outcome(outcome).await
    }

    pub async fn cancel(&self, contract_id: &str) -> bool {
        self.engine.lock().await.cancel(contract_id)
    }

    pub async fn run_maintenance(&self) -> MaintenanceReport {
        self.engine.lock().await.run_maintenance(Utc::now()).await
    }

    /// Exclusive access for management operations.
    pub async fn lock(&self) -> MutexGuard<'_, ContextualDecisionEngine> {
        self.engine.lock().await
    }
}
