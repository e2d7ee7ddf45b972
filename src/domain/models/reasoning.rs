//! Claim, evidence, and action-contract records that make up a reasoning
//! chain.
//!
//! A [`ReasoningChain`] is an arena owned by a single validation call. Claims,
//! evidence, and contracts reference each other by the string ids handed out
//! by the chain; nothing outlives the round that built it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::domain::errors::{DecisionError, DecisionResult};

/// Budget resource charged with a contract's `budget_cost`.
pub const COST_RESOURCE: &str = "cost_dollars";
/// Budget resource charged with a contract's `time_estimate`.
pub const TIME_RESOURCE: &str = "time_seconds";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Factual,
    Procedural,
    Causal,
    Conditional,
    Preference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: String,
    pub claim_type: ClaimType,
    pub statement: String,
    pub confidence: f64,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    ToolOutput,
    UserFeedback,
    HistoricalData,
    LogicalInference,
    ExternalSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub evidence_id: String,
    pub evidence_type: EvidenceType,
    /// Claim this evidence supports.
    pub claim_id: String,
    pub verification_target: String,
    pub expected_result: serde_json::Value,
    pub actual_result: Option<serde_json::Value>,
    pub verified: bool,
}

/// Lifecycle of an [`ActionContract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    Validated,
    Approved,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl ContractStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a contract in this state may move to `next`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (s, Self::Failed | Self::Cancelled) => !s.is_terminal(),
            (Self::Draft, Self::Validated)
            | (Self::Validated, Self::Approved)
            | (Self::Approved, Self::Executing | Self::Completed)
            | (Self::Executing, Self::Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Draft => "draft",
            Self::Validated => "validated",
            Self::Approved => "approved",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A declared tool invocation, gated on preconditions and budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionContract {
    pub contract_id: String,
    pub action_name: String,
    /// `None` for strategies that run without an external tool.
    pub tool_name: Option<String>,
    pub arguments: serde_json::Value,
    /// Claim ids that must hold before execution.
    pub preconditions: Vec<String>,
    pub resource_requirements: BTreeMap<String, f64>,
    pub budget_cost: f64,
    pub time_estimate: f64,
    status: ContractStatus,
    pub created_at: DateTime<Utc>,
}

impl ActionContract {
    pub fn new(action_name: impl Into<String>, tool_name: Option<String>) -> Self {
        Self {
            contract_id: format!("contract-{}", Uuid::new_v4()),
            action_name: action_name.into(),
            tool_name,
            arguments: serde_json::Value::Object(serde_json::Map::new()),
            preconditions: Vec::new(),
            resource_requirements: BTreeMap::new(),
            budget_cost: 0.0,
            time_estimate: 0.0,
            status: ContractStatus::Draft,
            created_at: Utc::now(),
        }
    }

    pub const fn status(&self) -> ContractStatus {
        self.status
    }

    pub fn transition(&mut self, next: ContractStatus) -> DecisionResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DecisionError::InvalidContractTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Everything this contract would draw from the budget ledger.
    ///
    /// `budget_cost` and `time_estimate` are charged to
    /// [`COST_RESOURCE`] and [`TIME_RESOURCE`] on top of any explicit
    /// requirement for those resources.
    pub fn required_resources(&self) -> BTreeMap<String, f64> {
        let mut required = self.resource_requirements.clone();
        *required.entry(COST_RESOURCE.to_string()).or_insert(0.0) += self.budget_cost;
        *required.entry(TIME_RESOURCE.to_string()).or_insert(0.0) += self.time_estimate;
        required
    }
}

/// Arena holding one round's claims, evidence, and contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningChain {
    pub chain_id: String,
    pub claims: Vec<Claim>,
    pub evidence: Vec<Evidence>,
    pub contracts: Vec<ActionContract>,
    pub created_at: DateTime<Utc>,
}

impl ReasoningChain {
    pub fn new() -> Self {
        Self {
            chain_id: Uuid::new_v4().to_string(),
            claims: Vec::new(),
            evidence: Vec::new(),
            contracts: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Append a claim and return its id.
    pub fn add_claim(
        &mut self,
        claim_type: ClaimType,
        statement: impl Into<String>,
        confidence: f64,
        dependencies: Vec<String>,
    ) -> String {
        let claim_id = format!("claim-{}", self.claims.len() + 1);
        self.claims.push(Claim {
            claim_id: claim_id.clone(),
            claim_type,
            statement: statement.into(),
            confidence: confidence.clamp(0.0, 1.0),
            dependencies,
        });
        claim_id
    }

    /// Append evidence for `claim_id` and return its id.
    pub fn add_evidence(
        &mut self,
        evidence_type: EvidenceType,
        claim_id: impl Into<String>,
        verification_target: impl Into<String>,
        expected_result: serde_json::Value,
    ) -> String {
        let evidence_id = format!("evidence-{}", self.evidence.len() + 1);
        self.evidence.push(Evidence {
            evidence_id: evidence_id.clone(),
            evidence_type,
            claim_id: claim_id.into(),
            verification_target: verification_target.into(),
            expected_result,
            actual_result: None,
            verified: false,
        });
        evidence_id
    }

    /// Append a contract and return its id.
    pub fn add_contract(&mut self, contract: ActionContract) -> String {
        let id = contract.contract_id.clone();
        self.contracts.push(contract);
        id
    }

    pub fn claim(&self, claim_id: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_id == claim_id)
    }

    pub fn evidence_mut(&mut self, evidence_id: &str) -> Option<&mut Evidence> {
        self.evidence.iter_mut().find(|e| e.evidence_id == evidence_id)
    }
}

impl Default for ReasoningChain {
    fn default() -> Self {
        Self::new()
    }
}

/// A single reason a contract failed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractViolation {
    SchemaInvalid { tool: String, errors: Vec<String> },
    ToolUnhealthy { tool: String, reason: String },
    BudgetExceeded { resource: String, requested: f64, available: f64 },
    UnresolvedPrecondition { claim_id: String },
}

impl From<ContractViolation> for DecisionError {
    fn from(violation: ContractViolation) -> Self {
        match violation {
            ContractViolation::SchemaInvalid { tool, errors } => Self::SchemaInvalid { tool, errors },
            ContractViolation::ToolUnhealthy { tool, reason } => Self::ToolUnhealthy { tool, reason },
            ContractViolation::BudgetExceeded {
                resource,
                requested,
                available,
            } => Self::BudgetExceeded {
                resource,
                requested,
                available,
            },
            ContractViolation::UnresolvedPrecondition { claim_id } => {
                Self::UnresolvedPrecondition(claim_id)
            }
        }
    }
}

/// Validation verdict for one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractValidation {
    pub contract_id: String,
    pub passed: bool,
    pub violations: Vec<ContractViolation>,
    /// Validation hit an unexpected error and the contract was kept anyway.
    pub fail_open: bool,
}

/// What a caller reads back after validating a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub chain_id: String,
    pub valid: bool,
    pub claim_count: usize,
    pub verified_evidence: usize,
    pub contracts: Vec<ContractValidation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_lifecycle() {
        let mut contract = ActionContract::new("run", None);
        assert_eq!(contract.status(), ContractStatus::Draft);
        contract.transition(ContractStatus::Validated).expect("draft -> validated");
        contract.transition(ContractStatus::Approved).expect("validated -> approved");
        contract.transition(ContractStatus::Executing).expect("approved -> executing");
        contract.transition(ContractStatus::Completed).expect("executing -> completed");
        assert!(contract.status().is_terminal());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut contract = ActionContract::new("run", None);
        let err = contract.transition(ContractStatus::Executing).unwrap_err();
        assert!(matches!(err, DecisionError::InvalidContractTransition { .. }));

        contract.transition(ContractStatus::Cancelled).expect("draft -> cancelled");
        assert!(contract.transition(ContractStatus::Failed).is_err());
    }

    #[test]
    fn test_required_resources_merge_cost_and_time() {
        let mut contract = ActionContract::new("run", Some("search".to_string()));
        contract.budget_cost = 0.1;
        contract.time_estimate = 10.0;
        contract.resource_requirements.insert("api_calls".to_string(), 2.0);
        contract.resource_requirements.insert(COST_RESOURCE.to_string(), 0.4);

        let required = contract.required_resources();
        assert!((required[COST_RESOURCE] - 0.5).abs() < 1e-12);
        assert!((required[TIME_RESOURCE] - 10.0).abs() < 1e-12);
        assert!((required["api_calls"] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_chain_ids_are_sequential() {
        let mut chain = ReasoningChain::new();
        let c1 = chain.add_claim(ClaimType::Procedural, "a applies", 0.8, vec![]);
        let c2 = chain.add_claim(ClaimType::Factual, "b holds", 1.4, vec![c1.clone()]);
        assert_eq!(c1, "claim-1");
        assert_eq!(c2, "claim-2");
        assert!((chain.claim(&c2).map(|c| c.confidence).unwrap_or_default() - 1.0).abs() < f64::EPSILON);

        let e1 = chain.add_evidence(EvidenceType::HistoricalData, &c1, "history", serde_json::json!({}));
        assert_eq!(e1, "evidence-1");
        assert!(chain.evidence_mut(&e1).is_some());
    }
}
