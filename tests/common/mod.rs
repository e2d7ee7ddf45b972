//! Common test utilities for integration tests
//!
//! Provides shared fixtures used across the integration test files.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use strategos::domain::models::{ArmObservation, Config, DecisionArm};
use strategos::{ContextualDecisionEngine, InMemoryParameterStore, StaticToolRegistry, ToolRegistry};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Engine backed by in-memory adapters with a single registered `search` tool.
#[allow(dead_code)]
pub async fn memory_engine(config: &Config) -> ContextualDecisionEngine {
    let registry = Arc::new(StaticToolRegistry::new());
    registry.register("search", None).await;
    ContextualDecisionEngine::new(
        config,
        Arc::new(InMemoryParameterStore::new()),
        registry as Arc<dyn ToolRegistry>,
    )
}

/// Arm whose lifetime counts and history both follow `results`.
#[allow(dead_code)]
pub fn arm_from_results(
    id: &str,
    path_type: &str,
    description: &str,
    results: &[bool],
    now: DateTime<Utc>,
) -> DecisionArm {
    let wins = results.iter().filter(|s| **s).count() as u64;
    arm_with_counts(id, path_type, description, wins, results.len() as u64 - wins, results, now)
}

/// Arm with explicit lifetime counts and a separate retained history.
#[allow(dead_code)]
pub fn arm_with_counts(
    id: &str,
    path_type: &str,
    description: &str,
    successes: u64,
    failures: u64,
    history: &[bool],
    now: DateTime<Utc>,
) -> DecisionArm {
    let observations: Vec<ArmObservation> = history
        .iter()
        .map(|s| ArmObservation {
            success: *s,
            reward: if *s { 1.0 } else { 0.0 },
            at: now,
        })
        .collect();
    let mut arm = DecisionArm::restore(
        id,
        path_type,
        successes,
        failures,
        successes as f64,
        observations,
        now,
    );
    arm.description = description.to_string();
    arm
}
