//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces for the engine's external
//! collaborators:
//! - ParameterStore: bandit parameter blobs and the outcome log
//! - ToolRegistry: tool existence, argument schemas, and health probes
//! - TaskClassifier: optional semantic classification of task text

pub mod parameter_store;
pub mod task_classifier;
pub mod tool_registry;

pub use parameter_store::{context_hash, OutcomeRecord, ParameterSet, ParameterStore};
pub use task_classifier::{ScoredLabel, TaskClassification, TaskClassifier};
pub use tool_registry::{ToolHealth, ToolRegistry};
