//! Algorithm cores and orchestration for the decision engine.

pub mod bandit;
pub mod bandit_manager;
pub mod budget_ledger;
pub mod decision_engine;
pub mod feature_extractor;
pub mod golden_templates;
pub mod linalg;
pub mod precondition_checker;
pub mod trial_ground;
pub mod verified_reasoning;

pub use bandit::{BanditAlgorithm, BanditPrediction, ContextualBandit, ContextualThompson, FitOutcome, LinUcb};
pub use bandit_manager::{BanditManager, BanditStats};
pub use budget_ledger::{BudgetLedger, FeasibilityReport, Reservation, ResourceUsage};
pub use decision_engine::{
    ContextualDecisionEngine, DecisionEngineState, DecisionSession, EngineStats, MaintenanceReport,
};
pub use feature_extractor::ContextFeatureExtractor;
pub use golden_templates::GoldenTemplateRegistry;
pub use precondition_checker::PreconditionChecker;
pub use trial_ground::TrialGroundManager;
pub use verified_reasoning::{CandidateVerification, GateStats, VerifiedReasoningGate};
