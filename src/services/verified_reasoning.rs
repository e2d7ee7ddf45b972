//! Verified reasoning gate.
//!
//! Before a candidate may run, the gate builds a minimal reasoning chain for
//! it (an applicability claim, supporting evidence, and an action contract)
//! and validates the contract in order:
//!
//! 1. every precondition names a claim in the chain
//! 2. the arguments satisfy the tool's declared schema
//! 3. the tool is registered and healthy
//! 4. the contract's resources fit in the budget ledger
//!
//! Validation only probes the ledger: the trial reservation is released
//! immediately, so candidates in one round are judged independently. The
//! selected candidate's contract is later [approved](VerifiedReasoningGate::approve),
//! which holds its reservation until the outcome arrives or it is cancelled.
//!
//! An unexpected error during validation (registry failure, broken schema)
//! keeps the candidate rather than dropping it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::errors::{DecisionError, DecisionResult};
use crate::domain::models::{
    ActionContract, Candidate, ClaimType, Config, ContractStatus, ContractValidation,
    ContractViolation, DecisionArm, EvidenceType, ReasoningChain, ValidationSummary,
    VerificationConfig,
};
use crate::domain::ports::ToolRegistry;

use super::budget_ledger::{BudgetLedger, FeasibilityReport};
use super::precondition_checker::PreconditionChecker;

/// Verification target recorded on applicability evidence.
const EVIDENCE_TARGET: &str = "historical_performance+tool_compatibility";

/// Counters over every chain the gate has validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GateStats {
    pub total_chains: u64,
    pub passed: u64,
    pub failed: u64,
    pub budget_rejections: u64,
    pub schema_rejections: u64,
    pub health_rejections: u64,
    pub fail_open: u64,
    pub approved: u64,
}

/// One candidate's validated chain.
#[derive(Debug, Clone)]
pub struct CandidateVerification {
    pub candidate_id: String,
    pub strategy_id: String,
    pub chain: ReasoningChain,
    pub validations: Vec<ContractValidation>,
}

impl CandidateVerification {
    /// A chain is valid only if every contract passed.
    pub fn passed(&self) -> bool {
        self.validations.iter().all(|v| v.passed)
    }

    pub fn violations(&self) -> Vec<ContractViolation> {
        self.validations
            .iter()
            .flat_map(|v| v.violations.iter().cloned())
            .collect()
    }

    pub fn summary(&self) -> ValidationSummary {
        ValidationSummary {
            chain_id: self.chain.chain_id.clone(),
            valid: self.passed(),
            claim_count: self.chain.claims.len(),
            verified_evidence: self.chain.evidence.iter().filter(|e| e.verified).count(),
            contracts: self.validations.clone(),
        }
    }

    /// Take the chain's contract for approval.
    pub fn into_contract(self) -> Option<ActionContract> {
        self.chain.contracts.into_iter().next()
    }
}

pub struct VerifiedReasoningGate {
    checker: PreconditionChecker,
    ledger: BudgetLedger,
    config: VerificationConfig,
    /// Approved contracts currently holding a reservation.
    active: HashMap<String, ActionContract>,
    stats: GateStats,
}

impl VerifiedReasoningGate {
    pub fn new(registry: Arc<dyn ToolRegistry>, config: &Config) -> Self {
        Self {
            checker: PreconditionChecker::new(registry, config.verification.health_cache_ttl_secs),
            ledger: BudgetLedger::new(config.global_budget.clone()),
            config: config.verification.clone(),
            active: HashMap::new(),
            stats: GateStats::default(),
        }
    }

    pub const fn ledger(&self) -> &BudgetLedger {
        &self.ledger
    }

    pub fn checker_mut(&mut self) -> &mut PreconditionChecker {
        &mut self.checker
    }

    pub const fn stats(&self) -> &GateStats {
        &self.stats
    }

    pub fn contract(&self, contract_id: &str) -> Option<&ActionContract> {
        self.active.get(contract_id)
    }

    pub fn active_contracts(&self) -> usize {
        self.active.len()
    }

    /// The contract a candidate would run under, in draft state.
    pub fn contract_for(&self, candidate: &Candidate) -> ActionContract {
        let action = candidate.action.as_ref();
        let mut contract = ActionContract::new(
            candidate.strategy_id.clone(),
            action.map(|a| a.tool_name.clone()),
        );
        contract.budget_cost = action
            .and_then(|a| a.budget_cost)
            .unwrap_or(self.config.default_budget_cost);
        contract.time_estimate = action
            .and_then(|a| a.time_estimate)
            .unwrap_or(self.config.default_time_estimate);
        if let Some(action) = action {
            contract.arguments = action.arguments.clone();
            contract.resource_requirements = action.resource_requirements.clone();
        }
        contract
    }

    /// Claim, evidence, and contract for one candidate.
    pub fn build_chain(&self, candidate: &Candidate, arm: Option<&DecisionArm>) -> ReasoningChain {
        let mut chain = ReasoningChain::new();
        let claim_id = chain.add_claim(
            ClaimType::Procedural,
            format!("candidate {} is applicable", candidate.candidate_id),
            self.config.claim_confidence,
            Vec::new(),
        );
        chain.add_evidence(
            EvidenceType::HistoricalData,
            &claim_id,
            EVIDENCE_TARGET,
            json!({
                "success_rate": arm.map(DecisionArm::success_rate),
                "activations": arm.map(DecisionArm::activation_count),
                "tool": candidate.action.as_ref().map(|a| a.tool_name.clone()),
            }),
        );
        let mut contract = self.contract_for(candidate);
        contract.preconditions.push(claim_id);
        chain.add_contract(contract);
        chain
    }

    /// Build and validate a candidate's chain.
    pub async fn validate_candidate(
        &mut self,
        candidate: &Candidate,
        arm: Option<&DecisionArm>,
        now: DateTime<Utc>,
    ) -> CandidateVerification {
        let mut chain = self.build_chain(candidate, arm);
        let mut validations = Vec::with_capacity(chain.contracts.len());

        for idx in 0..chain.contracts.len() {
            let verdict = self.check_contract(&chain, &chain.contracts[idx], now).await;
            let validation = match verdict {
                Ok(violations) => ContractValidation {
                    contract_id: chain.contracts[idx].contract_id.clone(),
                    passed: violations.is_empty(),
                    violations,
                    fail_open: false,
                },
                Err(e) => {
                    tracing::warn!(
                        candidate_id = %candidate.candidate_id,
                        error = %e,
                        "contract validation errored, keeping candidate"
                    );
                    self.stats.fail_open += 1;
                    ContractValidation {
                        contract_id: chain.contracts[idx].contract_id.clone(),
                        passed: true,
                        violations: Vec::new(),
                        fail_open: true,
                    }
                }
            };
            let next = if validation.passed {
                ContractStatus::Validated
            } else {
                ContractStatus::Failed
            };
            if let Err(e) = chain.contracts[idx].transition(next) {
                tracing::warn!(error = %e, "contract left in draft state");
            }
            validations.push(validation);
        }

        let passed = validations.iter().all(|v| v.passed);
        for evidence in &mut chain.evidence {
            evidence.actual_result = Some(json!({ "contracts_passed": passed }));
            evidence.verified = passed;
        }

        self.record_verdict(&validations);
        tracing::debug!(
            candidate_id = %candidate.candidate_id,
            passed,
            "candidate chain validated"
        );
        CandidateVerification {
            candidate_id: candidate.candidate_id.clone(),
            strategy_id: candidate.strategy_id.clone(),
            chain,
            validations,
        }
    }

    fn record_verdict(&mut self, validations: &[ContractValidation]) {
        self.stats.total_chains += 1;
        if validations.iter().all(|v| v.passed) {
            self.stats.passed += 1;
        } else {
            self.stats.failed += 1;
        }
        for violation in validations.iter().flat_map(|v| &v.violations) {
            match violation {
                ContractViolation::BudgetExceeded { .. } => self.stats.budget_rejections += 1,
                ContractViolation::SchemaInvalid { .. } => self.stats.schema_rejections += 1,
                ContractViolation::ToolUnhealthy { .. } => self.stats.health_rejections += 1,
                ContractViolation::UnresolvedPrecondition { .. } => {}
            }
        }
    }

    /// Run the validation steps, stopping at the first violation.
    ///
    /// `Err` means validation itself broke, not that the contract failed.
    async fn check_contract(
        &mut self,
        chain: &ReasoningChain,
        contract: &ActionContract,
        now: DateTime<Utc>,
    ) -> DecisionResult<Vec<ContractViolation>> {
        if let Some(missing) = contract
            .preconditions
            .iter()
            .find(|claim_id| chain.claim(claim_id).is_none())
        {
            return Ok(vec![ContractViolation::UnresolvedPrecondition {
                claim_id: missing.clone(),
            }]);
        }

        if let Some(tool) = &contract.tool_name {
            let errors = self.checker.validate_arguments(tool, &contract.arguments).await?;
            if !errors.is_empty() {
                return Ok(vec![ContractViolation::SchemaInvalid {
                    tool: tool.clone(),
                    errors,
                }]);
            }

            if !self.checker.tool_exists(tool).await? {
                return Ok(vec![ContractViolation::ToolUnhealthy {
                    tool: tool.clone(),
                    reason: "tool not registered".to_string(),
                }]);
            }
            let health = self.checker.check_tool_health(tool, now).await;
            if !health.healthy {
                return Ok(vec![ContractViolation::ToolUnhealthy {
                    tool: tool.clone(),
                    reason: health.error.unwrap_or_else(|| "unhealthy".to_string()),
                }]);
            }
        }

        match self
            .ledger
            .reserve(&contract.contract_id, &contract.required_resources(), now)
        {
            Ok(()) => {
                self.ledger.release(&contract.contract_id);
                Ok(Vec::new())
            }
            Err(DecisionError::BudgetExceeded {
                resource,
                requested,
                available,
            }) => Ok(vec![ContractViolation::BudgetExceeded {
                resource,
                requested,
                available,
            }]),
            Err(e) => Err(e),
        }
    }

    /// Reserve budget for a validated contract and mark it approved.
    ///
    /// On failure the contract is marked failed and nothing stays reserved.
    pub fn approve(&mut self, mut contract: ActionContract, now: DateTime<Utc>) -> DecisionResult<String> {
        if contract.status() != ContractStatus::Validated {
            return Err(DecisionError::InvalidContractTransition {
                from: contract.status().to_string(),
                to: ContractStatus::Approved.to_string(),
            });
        }
        let contract_id = contract.contract_id.clone();
        if let Err(e) = self
            .ledger
            .reserve(&contract_id, &contract.required_resources(), now)
        {
            contract.transition(ContractStatus::Failed)?;
            return Err(e);
        }
        if let Err(e) = contract.transition(ContractStatus::Approved) {
            self.ledger.release(&contract_id);
            return Err(e);
        }
        tracing::info!(contract_id = %contract_id, action = %contract.action_name, "contract approved");
        self.stats.approved += 1;
        self.active.insert(contract_id.clone(), contract);
        Ok(contract_id)
    }

    /// Mark an approved contract as running.
    pub fn begin_execution(&mut self, contract_id: &str) -> DecisionResult<()> {
        self.active
            .get_mut(contract_id)
            .ok_or_else(|| DecisionError::UnknownContract(contract_id.to_string()))?
            .transition(ContractStatus::Executing)
    }

    /// Close a contract with its outcome and release its reservation.
    pub fn complete(&mut self, contract_id: &str, success: bool) -> DecisionResult<ActionContract> {
        let mut contract = self
            .active
            .remove(contract_id)
            .ok_or_else(|| DecisionError::UnknownContract(contract_id.to_string()))?;
        self.ledger.release(contract_id);
        let status = if success {
            ContractStatus::Completed
        } else {
            ContractStatus::Failed
        };
        contract.transition(status)?;
        tracing::debug!(contract_id, %status, "contract closed");
        Ok(contract)
    }

    /// Cancel a contract and release its reservation.
    ///
    /// Returns whether the contract was still active.
    pub fn cancel(&mut self, contract_id: &str) -> bool {
        self.ledger.release(contract_id);
        match self.active.remove(contract_id) {
            Some(mut contract) => {
                if let Err(e) = contract.transition(ContractStatus::Cancelled) {
                    tracing::warn!(contract_id, error = %e, "cancel on closed contract");
                }
                tracing::info!(contract_id, "contract cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether all candidates could be funded at once right now.
    pub fn feasibility(&self, candidates: &[Candidate]) -> FeasibilityReport {
        let contracts: Vec<ActionContract> =
            candidates.iter().map(|c| self.contract_for(c)).collect();
        self.ledger.feasibility(&contracts)
    }
}
