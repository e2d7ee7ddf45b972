//! Strategos - Contextual Decision Engine
//!
//! Strategos chooses which candidate action (tool call, strategy, or plan) to
//! execute for a task, learns from the outcomes, and keeps the portfolio of
//! strategies healthy over time.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Decision-round models, errors, and ports
//! - **Service Layer** (`services`): Bandits, budget ledger, reasoning gate,
//!   trial ground, golden templates, and the engine that composes them
//! - **Adapters** (`adapters`): SQLite and in-memory port implementations
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use strategos::{Config, ContextualDecisionEngine, InMemoryParameterStore, StaticToolRegistry};
//!
//! let config = Config::default();
//! let store = Arc::new(InMemoryParameterStore::new());
//! let tools = Arc::new(StaticToolRegistry::new());
//! let mut engine = ContextualDecisionEngine::new(&config, store, tools);
//! let outcome = engine.decide(&request, chrono::Utc::now()).await;
//! ```

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::{InMemoryParameterStore, SqliteParameterStore, StaticToolRegistry};
pub use domain::models::{
    ActionContract, ActionOutcome, BanditAlgorithmKind, Candidate, CandidateAction, Config,
    DecisionArm, DecisionOutcome, DecisionRequest, FeatureVector, FeedbackReport, GoldenTemplate,
    LoggingConfig, Selection, SelectionMethod, TrialStatus,
};
pub use domain::ports::{ParameterStore, TaskClassifier, ToolRegistry};
pub use domain::{DecisionError, DecisionResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::logging::LoggerImpl;
pub use services::{
    BudgetLedger, ContextualDecisionEngine, DecisionSession, GoldenTemplateRegistry,
    PreconditionChecker, TrialGroundManager, VerifiedReasoningGate,
};
