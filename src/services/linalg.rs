//! Small dense linear algebra for the bandit algorithms.
//!
//! Matrices are square, row-major, and at most a few dozen dimensions, so
//! straightforward O(d^3) routines are sufficient. Binary encoding is
//! little-endian `f64`, which round-trips bit for bit.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DecisionError, DecisionResult};

/// Pivots smaller than this are treated as zero.
const SINGULAR_EPS: f64 = 1e-12;

/// Square row-major matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    dim: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            data: vec![0.0; dim * dim],
        }
    }

    /// `scale * I`.
    pub fn identity(dim: usize, scale: f64) -> Self {
        let mut m = Self::zeros(dim);
        for i in 0..dim {
            m.data[i * dim + i] = scale;
        }
        m
    }

    /// Build from row-major data. `data.len()` must be `dim * dim`.
    pub fn from_row_major(dim: usize, data: Vec<f64>) -> DecisionResult<Self> {
        if data.len() != dim * dim {
            return Err(DecisionError::DimensionMismatch {
                expected: dim * dim,
                actual: data.len(),
            });
        }
        Ok(Self { dim, data })
    }

    pub const fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.dim + col]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// `self += scale * x x^T`.
    pub fn add_outer(&mut self, x: &[f64], scale: f64) {
        let d = self.dim;
        for i in 0..d {
            for j in 0..d {
                self.data[i * d + j] += scale * x[i] * x[j];
            }
        }
    }

    /// `self * x`.
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        let d = self.dim;
        (0..d)
            .map(|i| self.data[i * d..(i + 1) * d].iter().zip(x).map(|(a, b)| a * b).sum())
            .collect()
    }

    /// `x^T * self * x`.
    pub fn quad_form(&self, x: &[f64]) -> f64 {
        dot(x, &self.mul_vec(x))
    }

    /// Inverse by Gauss-Jordan elimination with partial pivoting.
    ///
    /// Returns `None` when the matrix is singular or produces non-finite
    /// entries.
    pub fn inverse(&self) -> Option<Self> {
        let d = self.dim;
        let mut a = self.data.clone();
        let mut inv = Self::identity(d, 1.0).data;

        for col in 0..d {
            let pivot_row = (col..d).max_by(|&r1, &r2| {
                a[r1 * d + col]
                    .abs()
                    .partial_cmp(&a[r2 * d + col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })?;
            let pivot = a[pivot_row * d + col];
            if !pivot.is_finite() || pivot.abs() < SINGULAR_EPS {
                return None;
            }
            if pivot_row != col {
                for k in 0..d {
                    a.swap(col * d + k, pivot_row * d + k);
                    inv.swap(col * d + k, pivot_row * d + k);
                }
            }
            for k in 0..d {
                a[col * d + k] /= pivot;
                inv[col * d + k] /= pivot;
            }
            for row in 0..d {
                if row == col {
                    continue;
                }
                let factor = a[row * d + col];
                if factor == 0.0 {
                    continue;
                }
                for k in 0..d {
                    a[row * d + k] -= factor * a[col * d + k];
                    inv[row * d + k] -= factor * inv[col * d + k];
                }
            }
        }

        inv.iter().all(|v| v.is_finite()).then_some(Self { dim: d, data: inv })
    }

    /// Lower-triangular Cholesky factor `L` with `L L^T = self`.
    ///
    /// Returns `None` unless the matrix is symmetric positive-definite.
    pub fn cholesky(&self) -> Option<Self> {
        let d = self.dim;
        let mut l = Self::zeros(d);
        for i in 0..d {
            for j in 0..=i {
                let mut sum = self.get(i, j);
                for k in 0..j {
                    sum -= l.get(i, k) * l.get(j, k);
                }
                if i == j {
                    if sum <= SINGULAR_EPS || !sum.is_finite() {
                        return None;
                    }
                    l.data[i * d + j] = sum.sqrt();
                } else {
                    l.data[i * d + j] = sum / l.get(j, j);
                }
            }
        }
        Some(l)
    }

    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        let d = self.dim;
        (0..d).all(|i| (0..i).all(|j| (self.get(i, j) - self.get(j, i)).abs() <= tolerance))
    }

    /// Symmetric positive-definite check via Cholesky.
    pub fn is_positive_definite(&self) -> bool {
        self.is_symmetric(1e-9) && self.cholesky().is_some()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        vec_to_bytes(&self.data)
    }

    /// Decode a matrix of dimension `dim` from [`Matrix::to_bytes`] output.
    pub fn from_bytes(dim: usize, bytes: &[u8]) -> DecisionResult<Self> {
        Self::from_row_major(dim, vec_from_bytes(bytes)?)
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Encode as consecutive little-endian `f64`s.
pub fn vec_to_bytes(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn vec_from_bytes(bytes: &[u8]) -> DecisionResult<Vec<f64>> {
    if bytes.len() % 8 != 0 {
        return Err(DecisionError::Serialization(format!(
            "parameter blob of {} bytes is not a whole number of f64 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: &Matrix, b: &Matrix, tol: f64) -> bool {
        a.as_slice().iter().zip(b.as_slice()).all(|(x, y)| (x - y).abs() < tol)
    }

    #[test]
    fn test_identity_inverse() {
        let m = Matrix::identity(4, 2.0);
        let inv = m.inverse().expect("identity is invertible");
        assert!(approx_eq(&inv, &Matrix::identity(4, 0.5), 1e-12));
    }

    #[test]
    fn test_inverse_of_general_matrix() {
        let m = Matrix::from_row_major(2, vec![0.0, 2.0, 1.0, 1.0]).expect("2x2");
        let inv = m.inverse().expect("invertible with pivoting");
        let expected = Matrix::from_row_major(2, vec![-0.5, 1.0, 0.5, 0.0]).expect("2x2");
        assert!(approx_eq(&inv, &expected, 1e-12));
    }

    #[test]
    fn test_singular_matrix_has_no_inverse() {
        let mut m = Matrix::zeros(3);
        m.add_outer(&[1.0, 2.0, 3.0], 1.0);
        assert!(m.inverse().is_none());
        assert!(m.cholesky().is_none());
    }

    #[test]
    fn test_add_outer_keeps_symmetry() {
        let mut m = Matrix::identity(3, 1.0);
        m.add_outer(&[0.3, -1.0, 2.0], 1.0);
        m.add_outer(&[1.0, 0.0, 0.5], 0.5);
        assert!(m.is_symmetric(0.0));
        assert!(m.is_positive_definite());
    }

    #[test]
    fn test_cholesky_reconstructs() {
        let mut m = Matrix::identity(2, 1.0);
        m.add_outer(&[1.0, 1.0], 1.0);
        let l = m.cholesky().expect("spd");
        let rebuilt: Vec<f64> = (0..2)
            .flat_map(|i| {
                let l = &l;
                (0..2).map(move |j| (0..2).map(|k| l.get(i, k) * l.get(j, k)).sum::<f64>())
            })
            .collect();
        for (a, b) in rebuilt.iter().zip(m.as_slice()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_quad_form() {
        let m = Matrix::identity(2, 3.0);
        assert!((m.quad_form(&[1.0, 2.0]) - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_bytes_round_trip_is_bit_identical() {
        let mut m = Matrix::identity(3, 1.0);
        m.add_outer(&[0.1, 0.2, 0.3], 1.0 / 3.0);
        let decoded = Matrix::from_bytes(3, &m.to_bytes()).expect("decode");
        for (a, b) in decoded.as_slice().iter().zip(m.as_slice()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_bad_blob_lengths_rejected() {
        assert!(vec_from_bytes(&[0u8; 7]).is_err());
        assert!(Matrix::from_bytes(3, &vec_to_bytes(&[1.0; 4])).is_err());
    }
}
