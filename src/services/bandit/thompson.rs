//! Contextual Thompson Sampling with a Gaussian posterior per arm.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::domain::errors::{DecisionError, DecisionResult};
use crate::domain::models::{fit_dimension, BanditAlgorithmKind};
use crate::domain::ports::ParameterSet;
use crate::services::linalg::{dot, vec_from_bytes, vec_to_bytes, Matrix};

use super::{required_blob, BanditAlgorithm, BanditPrediction, FitOutcome};

/// Posterior over an arm's parameter vector: precision `S`, mean `mu`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThompsonArm {
    pub precision: Matrix,
    pub mean: Vec<f64>,
}

/// Contextual Thompson Sampling.
///
/// `alpha` scales the prior precision, `beta` the precision of each
/// observation.
#[derive(Debug)]
pub struct ContextualThompson {
    dim: usize,
    alpha: f64,
    beta: f64,
    arms: HashMap<String, ThompsonArm>,
    rng: StdRng,
}

impl ContextualThompson {
    /// A fixed `seed` makes sampling reproducible.
    pub fn new(dim: usize, alpha: f64, beta: f64, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Self {
            dim,
            alpha,
            beta,
            arms: HashMap::new(),
            rng,
        }
    }

    pub fn arm(&self, arm_id: &str) -> Option<&ThompsonArm> {
        self.arms.get(arm_id)
    }

    fn ensure_arm(&mut self, arm_id: &str) {
        if !self.arms.contains_key(arm_id) {
            self.arms.insert(
                arm_id.to_string(),
                ThompsonArm {
                    precision: Matrix::identity(self.dim, self.alpha),
                    mean: vec![0.0; self.dim],
                },
            );
        }
    }

    fn standard_normal(&mut self) -> Vec<f64> {
        (0..self.dim).map(|_| self.rng.sample(StandardNormal)).collect()
    }

    /// Draw `theta ~ N(mu, S^-1)`, or an independent standard normal when
    /// the posterior cannot be factored.
    fn sample_theta(&mut self, arm_id: &str) -> Vec<f64> {
        let z = self.standard_normal();
        let Some(arm) = self.arms.get(arm_id) else {
            return z;
        };
        let factor = arm.precision.inverse().and_then(|cov| cov.cholesky());
        match factor {
            Some(l) => {
                let mut theta = arm.mean.clone();
                for (i, t) in theta.iter_mut().enumerate() {
                    *t += (0..=i).map(|k| l.get(i, k) * z[k]).sum::<f64>();
                }
                theta
            }
            None => {
                tracing::warn!(arm_id, "Thompson precision singular, sampling standard normal");
                z
            }
        }
    }
}

impl BanditAlgorithm for ContextualThompson {
    fn kind(&self) -> BanditAlgorithmKind {
        BanditAlgorithmKind::Thompson
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn predict(&mut self, context: &[f64], candidates: &[String]) -> Option<BanditPrediction> {
        let x = fit_dimension(context, self.dim);
        let mut scores = Vec::with_capacity(candidates.len());
        for id in candidates {
            self.ensure_arm(id);
            let theta = self.sample_theta(id);
            scores.push((id.clone(), dot(&x, &theta)));
        }
        tracing::debug!(?scores, "Thompson scores");
        BanditPrediction::from_scores(scores)
    }

    fn fit(&mut self, context: &[f64], arm_id: &str, reward: f64) -> FitOutcome {
        let x = fit_dimension(context, self.dim);
        let beta = self.beta;
        self.ensure_arm(arm_id);
        let Some(arm) = self.arms.get_mut(arm_id) else {
            return FitOutcome::SkippedSingular;
        };

        let mut precision = arm.precision.clone();
        precision.add_outer(&x, beta);
        let Some(cov) = precision.inverse() else {
            tracing::warn!(arm_id, "Thompson posterior singular, update skipped");
            return FitOutcome::SkippedSingular;
        };

        let mut weighted = arm.precision.mul_vec(&arm.mean);
        for (w, xi) in weighted.iter_mut().zip(&x) {
            *w += beta * reward * xi;
        }
        arm.mean = cov.mul_vec(&weighted);
        arm.precision = precision;
        FitOutcome::Updated
    }

    fn has_arm(&self, arm_id: &str) -> bool {
        self.arms.contains_key(arm_id)
    }

    fn remove_arm(&mut self, arm_id: &str) {
        self.arms.remove(arm_id);
    }

    fn arm_ids(&self) -> Vec<String> {
        self.arms.keys().cloned().collect()
    }

    fn export_arm(&self, arm_id: &str) -> Option<ParameterSet> {
        let arm = self.arms.get(arm_id)?;
        Some(ParameterSet::from([
            ("S".to_string(), arm.precision.to_bytes()),
            ("mu".to_string(), vec_to_bytes(&arm.mean)),
        ]))
    }

    fn import_arm(&mut self, arm_id: &str, params: &ParameterSet) -> DecisionResult<()> {
        let mean = vec_from_bytes(required_blob(params, "mu")?)?;
        if mean.len() != self.dim {
            return Err(DecisionError::DimensionMismatch {
                expected: self.dim,
                actual: mean.len(),
            });
        }
        let precision = Matrix::from_bytes(self.dim, required_blob(params, "S")?)?;
        self.arms
            .insert(arm_id.to_string(), ThompsonArm { precision, mean });
        Ok(())
    }
}
