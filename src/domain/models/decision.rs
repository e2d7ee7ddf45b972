//! Inputs and results of a decision round.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::features::{Environment, FeatureVector};
use super::golden::RevocationReason;
use super::reasoning::{ContractViolation, ValidationSummary};

/// The tool invocation a candidate would perform if selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAction {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
    pub budget_cost: Option<f64>,
    pub time_estimate: Option<f64>,
    #[serde(default)]
    pub resource_requirements: BTreeMap<String, f64>,
}

impl CandidateAction {
    pub fn new(tool_name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            budget_cost: None,
            time_estimate: None,
            resource_requirements: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn with_cost(mut self, budget_cost: f64, time_estimate: f64) -> Self {
        self.budget_cost = Some(budget_cost);
        self.time_estimate = Some(time_estimate);
        self
    }
}

/// One option proposed by the upstream planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate_id: String,
    /// Semantic family of the strategy, e.g. `analytical` or `creative`.
    pub path_type: String,
    pub description: String,
    /// Arm key; stable across rounds.
    pub strategy_id: String,
    /// Planner marks strategies it synthesized at runtime.
    #[serde(default)]
    pub learned: bool,
    #[serde(default)]
    pub action: Option<CandidateAction>,
}

impl Candidate {
    pub fn new(
        candidate_id: impl Into<String>,
        path_type: impl Into<String>,
        description: impl Into<String>,
        strategy_id: impl Into<String>,
    ) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            path_type: path_type.into(),
            description: description.into(),
            strategy_id: strategy_id.into(),
            learned: false,
            action: None,
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: CandidateAction) -> Self {
        self.action = Some(action);
        self
    }

    #[must_use]
    pub const fn learned(mut self) -> Self {
        self.learned = true;
        self
    }
}

/// Everything the planner hands the engine for one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DecisionRequest {
    pub task: String,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub available_tools: Vec<String>,
    pub candidates: Vec<Candidate>,
}

impl DecisionRequest {
    pub fn new(task: impl Into<String>, candidates: Vec<Candidate>) -> Self {
        Self {
            task: task.into(),
            environment: Environment::new(),
            available_tools: Vec::new(),
            candidates,
        }
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.available_tools = tools;
        self
    }
}

/// How the selection was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    GoldenTemplate,
    Linucb,
    Thompson,
}

/// Score breakdown for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub strategy_id: String,
    pub bandit_score: f64,
    pub exploration_bonus: f64,
    pub total: f64,
}

/// The selection-info map returned with every selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionInfo {
    pub method: SelectionMethod,
    pub scores: Vec<CandidateScore>,
    /// Selection count per strategy, after this round.
    pub usage_counts: BTreeMap<String, u64>,
    /// Template match score when served from the fast path.
    pub template_score: Option<f64>,
    pub feature_degraded: bool,
    pub validation: Option<ValidationSummary>,
}

/// A chosen candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub candidate_id: String,
    pub strategy_id: String,
    /// Confidence in the choice, in `[0.0, 1.0]`.
    pub confidence: f64,
    pub context: FeatureVector,
    /// Approved contract holding the budget reservation for this run.
    pub contract_id: String,
    pub info: SelectionInfo,
}

/// A candidate dropped during a round, with the reasons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRejection {
    pub candidate_id: String,
    pub strategy_id: String,
    pub violations: Vec<ContractViolation>,
}

/// Explicit "no feasible candidate" signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionReport {
    pub reason: String,
    pub rejections: Vec<CandidateRejection>,
}

/// What a decision round returns: a selection or an explicit rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Selected(Selection),
    Rejected(RejectionReport),
}

impl DecisionOutcome {
    pub const fn selection(&self) -> Option<&Selection> {
        match self {
            Self::Selected(s) => Some(s),
            Self::Rejected(_) => None,
        }
    }

    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Side effects of ingesting one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FeedbackReport {
    pub arm_id: String,
    pub reward: f64,
    pub success: bool,
    pub promoted: bool,
    pub revoked: Option<RevocationReason>,
    pub culling_candidate: bool,
    pub culled: bool,
}
