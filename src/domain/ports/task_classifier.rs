//! Task classifier port used by feature extraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DecisionResult;

/// A label with the classifier's confidence in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredLabel {
    pub label: String,
    pub confidence: f64,
}

impl ScoredLabel {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Classifier verdict for one task. Any field may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TaskClassification {
    pub intent: Option<ScoredLabel>,
    pub domain: Option<ScoredLabel>,
    /// Complexity score in `[0.0, 1.0]` with confidence.
    pub complexity: Option<(f64, f64)>,
}

/// Pluggable semantic classifier for task text.
///
/// Results below the extractor's confidence floor are ignored in favour of
/// the built-in keyword heuristics.
#[async_trait]
pub trait TaskClassifier: Send + Sync {
    async fn classify(&self, task: &str) -> DecisionResult<TaskClassification>;
}
