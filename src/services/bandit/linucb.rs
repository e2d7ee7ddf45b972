//! LinUCB: linear upper confidence bound.

use std::collections::HashMap;

use crate::domain::errors::{DecisionError, DecisionResult};
use crate::domain::models::{fit_dimension, BanditAlgorithmKind};
use crate::domain::ports::ParameterSet;
use crate::services::linalg::{dot, vec_from_bytes, vec_to_bytes, Matrix};

use super::{required_blob, BanditAlgorithm, BanditPrediction, FitOutcome};

/// Per-arm ridge regression state.
#[derive(Debug, Clone, PartialEq)]
pub struct LinUcbArm {
    /// Design matrix, `I + sum(x x^T)`.
    pub a: Matrix,
    /// Reward-weighted context sum.
    pub b: Vec<f64>,
    /// Cached `A^-1 b`.
    pub theta: Vec<f64>,
}

impl LinUcbArm {
    fn new(dim: usize) -> Self {
        Self {
            a: Matrix::identity(dim, 1.0),
            b: vec![0.0; dim],
            theta: vec![0.0; dim],
        }
    }

    /// `theta^T x + alpha * sqrt(x^T A^-1 x)`.
    fn score(&self, x: &[f64], alpha: f64) -> Option<f64> {
        let a_inv = self.a.inverse()?;
        let theta = a_inv.mul_vec(&self.b);
        let variance = a_inv.quad_form(x).max(0.0);
        Some(dot(&theta, x) + alpha * variance.sqrt())
    }
}

/// LinUCB over a fixed context dimension.
#[derive(Debug)]
pub struct LinUcb {
    dim: usize,
    alpha: f64,
    arms: HashMap<String, LinUcbArm>,
}

impl LinUcb {
    pub fn new(dim: usize, alpha: f64) -> Self {
        Self {
            dim,
            alpha,
            arms: HashMap::new(),
        }
    }

    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn arm(&self, arm_id: &str) -> Option<&LinUcbArm> {
        self.arms.get(arm_id)
    }

    fn arm_mut(&mut self, arm_id: &str) -> &mut LinUcbArm {
        let dim = self.dim;
        self.arms
            .entry(arm_id.to_string())
            .or_insert_with(|| LinUcbArm::new(dim))
    }
}

impl BanditAlgorithm for LinUcb {
    fn kind(&self) -> BanditAlgorithmKind {
        BanditAlgorithmKind::Linucb
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn predict(&mut self, context: &[f64], candidates: &[String]) -> Option<BanditPrediction> {
        let x = fit_dimension(context, self.dim);
        let alpha = self.alpha;
        let mut scores = Vec::with_capacity(candidates.len());
        for id in candidates {
            let arm = self.arm_mut(id);
            let score = arm.score(&x, alpha).unwrap_or_else(|| {
                tracing::warn!(arm_id = %id, "LinUCB design matrix singular, scoring from prior");
                alpha * dot(&x, &x).sqrt()
            });
            scores.push((id.clone(), score));
        }
        tracing::debug!(?scores, "LinUCB scores");
        BanditPrediction::from_scores(scores)
    }

    fn fit(&mut self, context: &[f64], arm_id: &str, reward: f64) -> FitOutcome {
        let x = fit_dimension(context, self.dim);
        let arm = self.arm_mut(arm_id);
        arm.a.add_outer(&x, 1.0);
        for (bi, xi) in arm.b.iter_mut().zip(&x) {
            *bi += reward * xi;
        }
        match arm.a.inverse() {
            Some(a_inv) => {
                arm.theta = a_inv.mul_vec(&arm.b);
                FitOutcome::Updated
            }
            None => {
                tracing::warn!(arm_id, "LinUCB design matrix singular after update, theta kept");
                FitOutcome::SkippedSingular
            }
        }
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
            ("A".to_string(), arm.a.to_bytes()),
            ("b".to_string(), vec_to_bytes(&arm.b)),
            ("theta".to_string(), vec_to_bytes(&arm.theta)),
        ]))
    }

    fn import_arm(&mut self, arm_id: &str, params: &ParameterSet) -> DecisionResult<()> {
        let b = vec_from_bytes(required_blob(params, "b")?)?;
        if b.len() != self.dim {
            return Err(DecisionError::DimensionMismatch {
                expected: self.dim,
                actual: b.len(),
            });
        }
        let a = Matrix::from_bytes(self.dim, required_blob(params, "A")?)?;
        let theta = match params.get("theta") {
            Some(bytes) => vec_from_bytes(bytes)?,
            None => a.inverse().map_or_else(|| vec![0.0; self.dim], |inv| inv.mul_vec(&b)),
        };
        self.arms.insert(arm_id.to_string(), LinUcbArm { a, b, theta });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_cold_arms_tie_and_first_wins() {
        let mut bandit = LinUcb::new(4, 1.0);
        let prediction = bandit
            .predict(&[1.0, 0.0, 0.0, 0.0], &ids(&["a", "b", "c"]))
            .expect("scores");
        assert_eq!(prediction.best_id, "a");
        for (_, score) in &prediction.scores {
            assert!((score - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_fit_updates_a_b_theta() {
        let mut bandit = LinUcb::new(2, 1.0);
        assert_eq!(bandit.fit(&[1.0, 0.0], "a", 1.0), FitOutcome::Updated);
        let arm = bandit.arm("a").expect("created by fit");
        assert!((arm.a.get(0, 0) - 2.0).abs() < 1e-12);
        assert!((arm.b[0] - 1.0).abs() < 1e-12);
        assert!((arm.theta[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rewarded_arm_wins() {
        let mut bandit = LinUcb::new(2, 0.1);
        let x = [1.0, 0.5];
        for _ in 0..20 {
            bandit.fit(&x, "good", 1.0);
            bandit.fit(&x, "bad", 0.0);
        }
        let prediction = bandit.predict(&x, &ids(&["bad", "good"])).expect("scores");
        assert_eq!(prediction.best_id, "good");
    }

    #[test]
    fn test_dimension_repair() {
        let mut bandit = LinUcb::new(3, 1.0);
        bandit.fit(&[1.0, 1.0, 1.0, 9.0, 9.0], "a", 1.0);
        bandit.fit(&[1.0], "a", 1.0);
        let arm = bandit.arm("a").expect("arm");
        assert_eq!(arm.b.len(), 3);
        assert!((arm.a.get(0, 0) - 3.0).abs() < 1e-12);
        assert!((arm.a.get(1, 1) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_design_matrix_stays_spd() {
        let mut bandit = LinUcb::new(3, 1.0);
        for i in 0..30 {
            let t = f64::from(i);
            bandit.fit(&[t.sin(), t.cos(), 0.5], "a", (t * 0.1).fract());
        }
        assert!(bandit.arm("a").expect("arm").a.is_positive_definite());
    }

    #[test]
    fn test_export_import_bit_identical() {
        let mut bandit = LinUcb::new(3, 1.0);
        bandit.fit(&[0.1, 0.7, 0.3], "a", 0.9);
        let params = bandit.export_arm("a").expect("exported");

        let mut restored = LinUcb::new(3, 1.0);
        restored.import_arm("a", &params).expect("import");
        assert_eq!(restored.export_arm("a"), Some(params));
    }

    #[test]
    fn test_import_rejects_wrong_dimension() {
        let mut bandit = LinUcb::new(4, 1.0);
        bandit.fit(&[0.1; 4], "a", 0.9);
        let params = bandit.export_arm("a").expect("exported");
        let mut smaller = LinUcb::new(3, 1.0);
        assert!(matches!(
            smaller.import_arm("a", &params),
            Err(DecisionError::DimensionMismatch { expected: 3, actual: 4 })
        ));
    }
}
