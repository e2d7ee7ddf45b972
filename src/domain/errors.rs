//! Domain errors for the Strategos decision engine.

use thiserror::Error;

/// Domain-level errors that can occur while selecting, validating, or
/// learning from candidate strategies.
///
/// Several variants are non-fatal by contract: the engine recovers from
/// them locally (neutral features, random sampling, fresh arms) and only
/// logs them. They still exist as values so that every fallback is an
/// explicit match at the call site.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("Feature extraction degraded: {0}")]
    FeatureExtractionDegraded(String),

    #[error("Singular matrix for arm {arm_id}")]
    SingularMatrix { arm_id: String },

    #[error("Unknown arm: {0}")]
    UnknownArm(String),

    #[error("Tool {tool} is unhealthy: {reason}")]
    ToolUnhealthy { tool: String, reason: String },

    #[error("Arguments for tool {tool} violate its schema: {}", .errors.join(", "))]
    SchemaInvalid { tool: String, errors: Vec<String> },

    #[error("Budget exceeded for {resource}: requested {requested}, available {available}")]
    BudgetExceeded {
        resource: String,
        requested: f64,
        available: f64,
    },

    #[error("Precondition {0} does not name a claim in the chain")]
    UnresolvedPrecondition(String),

    #[error("All {0} candidates were rejected by contract validation")]
    AllCandidatesRejected(usize),

    #[error("No candidates were supplied")]
    NoCandidates,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid contract transition from {from} to {to}")]
    InvalidContractTransition { from: String, to: String },

    #[error("Contract {0} already holds a reservation")]
    DuplicateReservation(String),

    #[error("Unknown contract: {0}")]
    UnknownContract(String),

    #[error("Tool registry error: {0}")]
    Registry(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DecisionError {
    /// Whether this error excludes a candidate from the current round.
    pub const fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::ToolUnhealthy { .. }
                | Self::SchemaInvalid { .. }
                | Self::BudgetExceeded { .. }
                | Self::UnresolvedPrecondition(_)
        )
    }
}

pub type DecisionResult<T> = Result<T, DecisionError>;

impl From<sqlx::Error> for DecisionError {
    fn from(err: sqlx::Error) -> Self {
        DecisionError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for DecisionError {
    fn from(err: serde_json::Error) -> Self {
        DecisionError::Serialization(err.to_string())
    }
}
