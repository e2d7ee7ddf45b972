//! Fixed-dimension context encoding fed to the contextual bandit.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Number of numeric slots in a [`FeatureVector`].
pub const FEATURE_DIM: usize = 8;

/// Neutral value used for every slot when extraction degrades.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Label used for intent and domain when nothing better is known.
pub const GENERAL_LABEL: &str = "general";

/// Free-form environment map supplied by the planner alongside a task.
pub type Environment = HashMap<String, serde_json::Value>;

/// The eight slots of a [`FeatureVector`], in vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSlot {
    TaskComplexity,
    InputLength,
    InputStructure,
    HourOfDay,
    NetworkQuality,
    SystemLoad,
    TimeBudget,
    CostBudget,
}

impl FeatureSlot {
    /// All slots in vector order.
    pub const ALL: [Self; FEATURE_DIM] = [
        Self::TaskComplexity,
        Self::InputLength,
        Self::InputStructure,
        Self::HourOfDay,
        Self::NetworkQuality,
        Self::SystemLoad,
        Self::TimeBudget,
        Self::CostBudget,
    ];

    /// Position of this slot inside the vector.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stable name used in serialized feature maps.
    pub const fn name(self) -> &'static str {
        match self {
            Self::TaskComplexity => "task_complexity",
            Self::InputLength => "input_length",
            Self::InputStructure => "input_structure",
            Self::HourOfDay => "hour_of_day",
            Self::NetworkQuality => "network_quality",
            Self::SystemLoad => "system_load",
            Self::TimeBudget => "time_budget",
            Self::CostBudget => "cost_budget",
        }
    }
}

/// Numeric encoding of one decision's task and environment.
///
/// Built once per decision and never mutated afterwards. Every slot is a
/// finite value in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: [f64; FEATURE_DIM],
}

impl FeatureVector {
    /// Build a vector, clamping each slot into `[0.0, 1.0]`.
    ///
    /// Non-finite inputs are replaced by [`NEUTRAL_SCORE`].
    pub fn new(values: [f64; FEATURE_DIM]) -> Self {
        let mut clean = values;
        for v in &mut clean {
            *v = if v.is_finite() {
                v.clamp(0.0, 1.0)
            } else {
                NEUTRAL_SCORE
            };
        }
        Self { values: clean }
    }

    /// The all-neutral vector returned when extraction degrades.
    pub const fn neutral() -> Self {
        Self {
            values: [NEUTRAL_SCORE; FEATURE_DIM],
        }
    }

    pub const fn get(&self, slot: FeatureSlot) -> f64 {
        self.values[slot.index()]
    }

    pub const fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Copy of the vector repaired to `dim` slots.
    pub fn to_dimension(&self, dim: usize) -> Vec<f64> {
        fit_dimension(&self.values, dim)
    }

    /// Slot name to value, ordered by name for deterministic serialization.
    pub fn named(&self) -> BTreeMap<&'static str, f64> {
        FeatureSlot::ALL
            .iter()
            .map(|slot| (slot.name(), self.get(*slot)))
            .collect()
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Zero-pad or truncate `x` to exactly `dim` entries.
pub fn fit_dimension(x: &[f64], dim: usize) -> Vec<f64> {
    let mut out: Vec<f64> = x.iter().copied().take(dim).collect();
    out.resize(dim, 0.0);
    out
}

/// Coarse complexity classification of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityBucket {
    Low,
    #[default]
    Medium,
    High,
}

impl ComplexityBucket {
    /// Bucket a complexity score in `[0.0, 1.0]`.
    pub fn from_score(score: f64) -> Self {
        if score < 0.34 {
            Self::Low
        } else if score < 0.67 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

/// Auxiliary labels derived alongside the vector.
///
/// Used for golden-template matching and evidence, never fed to the
/// bandit directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextLabels {
    pub intent: String,
    pub domain: String,
    pub complexity: ComplexityBucket,
    /// Fraction of a ten-tool toolbox that is available, in `[0.0, 1.0]`.
    pub tool_availability: f64,
}

impl Default for ContextLabels {
    fn default() -> Self {
        Self {
            intent: GENERAL_LABEL.to_string(),
            domain: GENERAL_LABEL.to_string(),
            complexity: ComplexityBucket::Medium,
            tool_availability: NEUTRAL_SCORE,
        }
    }
}

/// Result of feature extraction: the vector, its labels, and the
/// degradation reason when neutral defaults were substituted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContext {
    pub vector: FeatureVector,
    pub labels: ContextLabels,
    pub degraded: Option<String>,
}

impl ExtractedContext {
    pub fn neutral(reason: impl Into<String>) -> Self {
        Self {
            vector: FeatureVector::neutral(),
            labels: ContextLabels::default(),
            degraded: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_and_sanitizes() {
        let v = FeatureVector::new([1.5, -0.2, f64::NAN, 0.3, f64::INFINITY, 0.0, 1.0, 0.7]);
        assert!((v.get(FeatureSlot::TaskComplexity) - 1.0).abs() < f64::EPSILON);
        assert!(v.get(FeatureSlot::InputLength).abs() < f64::EPSILON);
        assert!((v.get(FeatureSlot::InputStructure) - NEUTRAL_SCORE).abs() < f64::EPSILON);
        assert!((v.get(FeatureSlot::NetworkQuality) - NEUTRAL_SCORE).abs() < f64::EPSILON);
        assert!((v.get(FeatureSlot::CostBudget) - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fit_dimension_pads_and_truncates() {
        assert_eq!(fit_dimension(&[1.0, 2.0], 4), vec![1.0, 2.0, 0.0, 0.0]);
        assert_eq!(fit_dimension(&[1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
        assert!(fit_dimension(&[1.0], 0).is_empty());
    }

    #[test]
    fn test_named_covers_every_slot() {
        let named = FeatureVector::neutral().named();
        assert_eq!(named.len(), FEATURE_DIM);
        assert!(named.contains_key("hour_of_day"));
        assert!(named.values().all(|v| (*v - NEUTRAL_SCORE).abs() < f64::EPSILON));
    }

    #[test]
    fn test_complexity_bucket_from_score() {
        assert_eq!(ComplexityBucket::from_score(0.0), ComplexityBucket::Low);
        assert_eq!(ComplexityBucket::from_score(0.5), ComplexityBucket::Medium);
        assert_eq!(ComplexityBucket::from_score(0.75), ComplexityBucket::High);
    }
}
