//! Context feature extraction.
//!
//! Turns task text plus the planner's environment map into a
//! [`FeatureVector`] and a set of auxiliary labels. Extraction fails softly:
//! any malformed input yields the neutral vector with the reason attached.

use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use serde_json::Value;

use crate::domain::errors::{DecisionError, DecisionResult};
use crate::domain::models::{
    ComplexityBucket, ContextLabels, Environment, ExtractedContext, FeatureVector,
};
use crate::domain::models::features::{GENERAL_LABEL, NEUTRAL_SCORE};
use crate::domain::ports::{ScoredLabel, TaskClassification, TaskClassifier};

/// Classifier labels below this confidence are replaced by keyword heuristics.
pub const CLASSIFIER_CONFIDENCE_FLOOR: f64 = 0.6;

const LONG_TASK_CHARS: usize = 200;
const LENGTH_SATURATION_CHARS: f64 = 500.0;
const TOOLBOX_SIZE: f64 = 10.0;
const LATENCY_SATURATION_MS: f64 = 1000.0;

const COMPLEXITY_WORDS: [&str; 3] = ["complex", "detailed", "comprehensive"];
const MULTI_STEP_WORDS: [&str; 2] = ["step", "process"];

const INTENT_KEYWORDS: [(&str, &[&str]); 5] = [
    ("search", &["search", "find", "look up"]),
    ("analysis", &["analyze", "analyse", "study", "evaluate"]),
    ("creation", &["create", "generate", "build", "write"]),
    ("modification", &["modify", "update", "change", "fix"]),
    ("explanation", &["explain", "describe", "why"]),
];

const DOMAIN_KEYWORDS: [(&str, &[&str]); 4] = [
    ("technical", &["code", "programming", "software", "database"]),
    ("business", &["business", "market", "revenue", "customer"]),
    ("academic", &["academic", "research", "paper", "thesis"]),
    ("creative", &["creative", "design", "story", "artistic"]),
];

/// Builds feature vectors for decision rounds.
#[derive(Clone, Default)]
pub struct ContextFeatureExtractor {
    classifier: Option<Arc<dyn TaskClassifier>>,
}

impl ContextFeatureExtractor {
    pub fn new() -> Self {
        Self { classifier: None }
    }

    pub fn with_classifier(classifier: Arc<dyn TaskClassifier>) -> Self {
        Self {
            classifier: Some(classifier),
        }
    }

    /// Extract features, substituting neutral defaults on any error.
    pub async fn extract(
        &self,
        task: &str,
        environment: &Environment,
        available_tools: &[String],
        now: DateTime<Utc>,
    ) -> ExtractedContext {
        match self.try_extract(task, environment, available_tools, now).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(error = %e, "feature extraction degraded, using neutral context");
                ExtractedContext::neutral(e.to_string())
            }
        }
    }

    /// Extraction without the neutral fallback.
    pub async fn try_extract(
        &self,
        task: &str,
        environment: &Environment,
        available_tools: &[String],
        now: DateTime<Utc>,
    ) -> DecisionResult<ExtractedContext> {
        let lowered = task.to_lowercase();
        let classification = self.classify(task).await;

        let keyword_complexity = keyword_complexity(task, &lowered);
        let complexity = classification
            .complexity
            .filter(|(_, confidence)| *confidence >= CLASSIFIER_CONFIDENCE_FLOOR)
            .map_or(keyword_complexity, |(score, _)| score);
        let intent = confident_label(classification.intent.as_ref())
            .unwrap_or_else(|| keyword_label(&lowered, &INTENT_KEYWORDS));
        let domain = confident_label(classification.domain.as_ref())
            .unwrap_or_else(|| keyword_label(&lowered, &DOMAIN_KEYWORDS));

        let length = (task.chars().count() as f64 / LENGTH_SATURATION_CHARS).min(1.0);
        let structure = structure_score(task, environment);
        let hour = f64::from(now.hour()) / 24.0;

        let network_quality = env_number(environment, "network_latency")?
            .map_or(1.0, |latency| 1.0 - latency / LATENCY_SATURATION_MS);
        let system_load = env_number(environment, "resource_usage")?.unwrap_or(NEUTRAL_SCORE);
        let mut time_budget = env_number(environment, "time_pressure")?.unwrap_or(NEUTRAL_SCORE);
        if env_flag(environment, "real_time_requirements")
            || env_flag(environment, "performance_critical")
        {
            time_budget *= 0.5;
        }
        let cost_budget = env_number(environment, "cost_budget")?.unwrap_or(NEUTRAL_SCORE);

        let vector = FeatureVector::new([
            complexity,
            length,
            structure,
            hour,
            network_quality,
            system_load,
            time_budget,
            cost_budget,
        ]);
        let labels = ContextLabels {
            intent,
            domain,
            complexity: ComplexityBucket::from_score(complexity),
            tool_availability: (available_tools.len() as f64 / TOOLBOX_SIZE).min(1.0),
        };
        tracing::debug!(
            intent = %labels.intent,
            domain = %labels.domain,
            complexity,
            "extracted decision context"
        );
        Ok(ExtractedContext {
            vector,
            labels,
            degraded: None,
        })
    }

    async fn classify(&self, task: &str) -> TaskClassification {
        let Some(classifier) = &self.classifier else {
            return TaskClassification::default();
        };
        match classifier.classify(task).await {
            Ok(classification) => classification,
            Err(e) => {
                tracing::warn!(error = %e, "task classifier failed, using keyword heuristics");
                TaskClassification::default()
            }
        }
    }
}

fn confident_label(label: Option<&ScoredLabel>) -> Option<String> {
    label
        .filter(|l| l.confidence >= CLASSIFIER_CONFIDENCE_FLOOR && !l.label.is_empty())
        .map(|l| l.label.clone())
}

fn keyword_label(lowered: &str, table: &[(&str, &[&str])]) -> String {
    table
        .iter()
        .find(|(_, words)| words.iter().any(|w| lowered.contains(w)))
        .map_or(GENERAL_LABEL, |(label, _)| *label)
        .to_string()
}

fn fraction(indicators: &[bool]) -> f64 {
    indicators.iter().filter(|b| **b).count() as f64 / indicators.len() as f64
}

fn keyword_complexity(task: &str, lowered: &str) -> f64 {
    fraction(&[
        task.chars().count() > LONG_TASK_CHARS,
        task.matches('?').count() > 1,
        COMPLEXITY_WORDS.iter().any(|w| lowered.contains(w)),
        MULTI_STEP_WORDS.iter().any(|w| lowered.contains(w)),
    ])
}

fn structure_score(task: &str, environment: &Environment) -> f64 {
    fraction(&[
        task.contains('\n'),
        task.matches('.').count() > 2,
        task.matches(',').count() > 3,
        environment.len() > 3,
    ])
}

/// Read a numeric environment value. Absent or null keys yield `None`;
/// anything that is not a finite number degrades extraction.
fn env_number(environment: &Environment, key: &str) -> DecisionResult<Option<f64>> {
    let value = match environment.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match value {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(DecisionError::FeatureExtractionDegraded(format!(
            "environment value {key} is not a finite number"
        ))),
    }
}

fn env_flag(environment: &Environment, key: &str) -> bool {
    matches!(environment.get(key), Some(Value::Bool(true)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::FeatureSlot;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;

    struct FixedClassifier(DecisionResult<TaskClassification>);

    #[async_trait]
    impl TaskClassifier for FixedClassifier {
        async fn classify(&self, _task: &str) -> DecisionResult<TaskClassification> {
            match &self.0 {
                Ok(c) => Ok(c.clone()),
                Err(_) => Err(DecisionError::Registry("classifier offline".to_string())),
            }
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid time")
    }

    fn env(pairs: &[(&str, Value)]) -> Environment {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_keyword_fallback_labels() {
        let extractor = ContextFeatureExtractor::new();
        let ctx = extractor
            .extract("Find the programming guide", &Environment::new(), &[], noon())
            .await;
        assert_eq!(ctx.labels.intent, "search");
        assert_eq!(ctx.labels.domain, "technical");
        assert!(ctx.degraded.is_none());

        let ctx = extractor.extract("hello there", &Environment::new(), &[], noon()).await;
        assert_eq!(ctx.labels.intent, GENERAL_LABEL);
        assert_eq!(ctx.labels.domain, GENERAL_LABEL);
    }

    #[tokio::test]
    async fn test_complexity_and_length() {
        let extractor = ContextFeatureExtractor::new();
        let task = "Give a detailed, step by step process? And why?";
        let ctx = extractor.extract(task, &Environment::new(), &[], noon()).await;
        assert!((ctx.vector.get(FeatureSlot::TaskComplexity) - 0.75).abs() < 1e-12);
        assert_eq!(ctx.labels.complexity, ComplexityBucket::High);

        let long = "a".repeat(1000);
        let ctx = extractor.extract(&long, &Environment::new(), &[], noon()).await;
        assert!((ctx.vector.get(FeatureSlot::InputLength) - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_environment_features() {
        let extractor = ContextFeatureExtractor::new();
        let environment = env(&[
            ("network_latency", json!(250.0)),
            ("resource_usage", json!(0.9)),
            ("time_pressure", json!(0.8)),
            ("real_time_requirements", json!(true)),
        ]);
        let tools = vec!["search".to_string(), "calc".to_string()];
        let ctx = extractor.extract("task", &environment, &tools, noon()).await;
        let v = ctx.vector;
        assert!((v.get(FeatureSlot::NetworkQuality) - 0.75).abs() < 1e-12);
        assert!((v.get(FeatureSlot::SystemLoad) - 0.9).abs() < 1e-12);
        assert!((v.get(FeatureSlot::TimeBudget) - 0.4).abs() < 1e-12);
        assert!((v.get(FeatureSlot::CostBudget) - NEUTRAL_SCORE).abs() < f64::EPSILON);
        assert!((v.get(FeatureSlot::HourOfDay) - 0.5).abs() < f64::EPSILON);
        assert!((ctx.labels.tool_availability - 0.2).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_malformed_environment_degrades_to_neutral() {
        let extractor = ContextFeatureExtractor::new();
        let environment = env(&[("network_latency", json!("fast"))]);
        let ctx = extractor.extract("Find code", &environment, &[], noon()).await;
        assert_eq!(ctx.vector, FeatureVector::neutral());
        assert_eq!(ctx.labels, ContextLabels::default());
        assert!(ctx.degraded.is_some());

        let environment = env(&[("cost_budget", json!("inf"))]);
        let result = extractor
            .try_extract("task", &environment, &[], noon())
            .await;
        assert!(matches!(result, Err(DecisionError::FeatureExtractionDegraded(_))));
    }

    #[tokio::test]
    async fn test_confident_classifier_overrides_keywords() {
        let classification = TaskClassification {
            intent: Some(ScoredLabel::new("creation", 0.9)),
            domain: Some(ScoredLabel::new("business", 0.4)),
            complexity: Some((0.1, 0.95)),
        };
        let extractor =
            ContextFeatureExtractor::with_classifier(Arc::new(FixedClassifier(Ok(classification))));
        let ctx = extractor
            .extract("Find a detailed programming process", &Environment::new(), &[], noon())
            .await;
        assert_eq!(ctx.labels.intent, "creation");
        assert_eq!(ctx.labels.domain, "technical");
        assert!((ctx.vector.get(FeatureSlot::TaskComplexity) - 0.1).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_classifier_error_uses_keywords() {
        let extractor = ContextFeatureExtractor::with_classifier(Arc::new(FixedClassifier(Err(
            DecisionError::Registry(String::new()),
        ))));
        let ctx = extractor.extract("explain this", &Environment::new(), &[], noon()).await;
        assert_eq!(ctx.labels.intent, "explanation");
        assert!(ctx.degraded.is_none());
    }
}
