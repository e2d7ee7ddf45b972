//! Domain models for the decision engine.

pub mod arm;
pub mod config;
pub mod decision;
pub mod features;
pub mod golden;
pub mod outcome;
pub mod reasoning;
pub mod trial;

pub use arm::{ArmObservation, DecisionArm, PathSource, MAX_ARM_HISTORY};
pub use config::{
    BanditAlgorithmKind, BanditConfig, Config, DatabaseConfig, GoldenConfig, LoggingConfig,
    TrialConfig, VerificationConfig,
};
pub use decision::{
    Candidate, CandidateAction, CandidateRejection, CandidateScore, DecisionOutcome,
    DecisionRequest, FeedbackReport, RejectionReport, Selection, SelectionInfo, SelectionMethod,
};
pub use features::{
    fit_dimension, ComplexityBucket, ContextLabels, Environment, ExtractedContext, FeatureSlot,
    FeatureVector, FEATURE_DIM,
};
pub use golden::{GoldenTemplate, RevocationReason, TemplateEvaluation, TemplateMatch, TemplateStats};
pub use outcome::{ActionOutcome, SuccessMetric};
pub use reasoning::{
    ActionContract, Claim, ClaimType, ContractStatus, ContractValidation, ContractViolation,
    Evidence, EvidenceType, ReasoningChain, ValidationSummary,
};
pub use trial::{
    CullReason, CullRecord, CullingReport, TrialAnalytics, TrialRecord, TrialStatus, WatchEntry,
};
