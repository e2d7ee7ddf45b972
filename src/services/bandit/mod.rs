//! Contextual multi-armed bandits.
//!
//! Two algorithms share the [`BanditAlgorithm`] interface:
//! - [`LinUcb`]: deterministic upper confidence bound over a ridge
//!   regression estimate.
//! - [`ContextualThompson`]: samples a parameter vector from a Gaussian
//!   posterior per decision.
//!
//! The engine holds a [`ContextualBandit`], a closed enum over the two, so the
//! algorithm is chosen once from configuration. Parameters are created lazily
//! the first time an arm is scored or fitted. Context vectors of the wrong
//! length are zero-padded or truncated to the configured dimension before
//! every call.

mod linucb;
mod thompson;

pub use linucb::LinUcb;
pub use thompson::ContextualThompson;

use serde::{Deserialize, Serialize};

use crate::domain::errors::DecisionResult;
use crate::domain::models::{BanditAlgorithmKind, Config};
use crate::domain::ports::ParameterSet;

/// Scores produced by one `predict` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanditPrediction {
    pub best_id: String,
    pub best_score: f64,
    /// Score per candidate, in candidate order.
    pub scores: Vec<(String, f64)>,
}

impl BanditPrediction {
    /// Pick the first candidate reaching the maximum score.
    ///
    /// Non-finite scores never win. Returns `None` for an empty slate.
    pub fn from_scores(scores: Vec<(String, f64)>) -> Option<Self> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, (_, score)) in scores.iter().enumerate() {
            let score = if score.is_finite() { *score } else { f64::NEG_INFINITY };
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((idx, score)),
            }
        }
        let (idx, best_score) = best?;
        Some(Self {
            best_id: scores[idx].0.clone(),
            best_score,
            scores,
        })
    }
}

/// What a `fit` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitOutcome {
    Updated,
    /// The posterior update was singular; parameters were left untouched.
    SkippedSingular,
}

/// Shared contract of the contextual bandit algorithms.
pub trait BanditAlgorithm: Send {
    fn kind(&self) -> BanditAlgorithmKind;

    /// Configured context dimension.
    fn dim(&self) -> usize;

    /// Score every candidate and pick the best.
    fn predict(&mut self, context: &[f64], candidates: &[String]) -> Option<BanditPrediction>;

    /// Learn from one observed reward.
    fn fit(&mut self, context: &[f64], arm_id: &str, reward: f64) -> FitOutcome;

    fn has_arm(&self, arm_id: &str) -> bool;

    /// Forget an arm's parameters entirely.
    fn remove_arm(&mut self, arm_id: &str);

    fn arm_ids(&self) -> Vec<String>;

    /// Binary encoding of an arm's parameters, if it has any.
    fn export_arm(&self, arm_id: &str) -> Option<ParameterSet>;

    /// Replace an arm's parameters with a previously exported set.
    fn import_arm(&mut self, arm_id: &str, params: &ParameterSet) -> DecisionResult<()>;
}

/// The configured bandit.
#[derive(Debug)]
pub enum ContextualBandit {
    LinUcb(LinUcb),
    Thompson(ContextualThompson),
}

impl ContextualBandit {
    pub fn from_config(config: &Config) -> Self {
        match config.algorithm {
            BanditAlgorithmKind::Linucb => {
                Self::LinUcb(LinUcb::new(config.feature_dim, config.bandit.linucb_alpha))
            }
            BanditAlgorithmKind::Thompson => Self::Thompson(ContextualThompson::new(
                config.feature_dim,
                config.bandit.thompson_alpha,
                config.bandit.thompson_beta,
                config.bandit.seed,
            )),
        }
    }

    fn inner(&self) -> &dyn BanditAlgorithm {
        match self {
            Self::LinUcb(b) => b,
            Self::Thompson(b) => b,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn BanditAlgorithm {
        match self {
            Self::LinUcb(b) => b,
            Self::Thompson(b) => b,
        }
    }
}

impl BanditAlgorithm for ContextualBandit {
    fn kind(&self) -> BanditAlgorithmKind {
        self.inner().kind()
    }

    fn dim(&self) -> usize {
        self.inner().dim()
    }

    fn predict(&mut self, context: &[f64], candidates: &[String]) -> Option<BanditPrediction> {
        self.inner_mut().predict(context, candidates)
    }

    fn fit(&mut self, context: &[f64], arm_id: &str, reward: f64) -> FitOutcome {
        self.inner_mut().fit(context, arm_id, reward)
    }

    fn has_arm(&self, arm_id: &str) -> bool {
        self.inner().has_arm(arm_id)
    }

    fn remove_arm(&mut self, arm_id: &str) {
        self.inner_mut().remove_arm(arm_id);
    }

    fn arm_ids(&self) -> Vec<String> {
        self.inner().arm_ids()
    }

    fn export_arm(&self, arm_id: &str) -> Option<ParameterSet> {
        self.inner().export_arm(arm_id)
    }

    fn import_arm(&mut self, arm_id: &str, params: &ParameterSet) -> DecisionResult<()> {
        self.inner_mut().import_arm(arm_id, params)
    }
}

/// Fetch a named blob or report which one is missing.
pub(crate) fn required_blob<'a>(params: &'a ParameterSet, name: &str) -> DecisionResult<&'a [u8]> {
    params.get(name).map(Vec::as_slice).ok_or_else(|| {
        crate::domain::errors::DecisionError::Serialization(format!("missing parameter {name}"))
    })
}
