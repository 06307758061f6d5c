//! Scalar numeric kernels for probability computations.
//!
//! This module contains the reference kernels shared by the inference
//! algorithms: log-space accumulation, Cholesky factorization and the
//! multivariate Gaussian log-density evaluated through the factor. All
//! kernels are pure and deterministic.

/// Floor on Cholesky pivots. A diagonal entry at or below this value means
/// the matrix is not positive definite for our purposes.
const MIN_CHOLESKY_PIVOT: f64 = 1e-12;

/// Numerically stable `ln(sum(exp(values)))`.
///
/// Returns negative infinity for an empty slice. Non-finite maxima are
/// returned as-is so that `-inf` inputs collapse without producing NaN.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let m = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !m.is_finite() {
        return m;
    }
    m + values.iter().map(|v| (v - m).exp()).sum::<f64>().ln()
}

/// Lower-triangular Cholesky factor of a symmetric positive-definite matrix.
///
/// Stores the factor row-major together with the log-determinant of the
/// original matrix, which is all the Gaussian kernels below need.
#[derive(Debug, Clone)]
pub struct CholeskyFactor {
    dim: usize,
    /// Row-major lower triangle, entries above the diagonal are zero.
    lower: Vec<f64>,
    /// `ln|A| = 2 * sum(ln L_ii)`.
    log_det: f64,
}

impl CholeskyFactor {
    /// Factors a square symmetric matrix given as rows.
    ///
    /// Returns `None` when the matrix is not square, not symmetric, or not
    /// positive definite (a pivot fell below the stability floor).
    pub fn new(matrix: &[Vec<f64>]) -> Option<Self> {
        let dim = matrix.len();
        if matrix.iter().any(|row| row.len() != dim) {
            return None;
        }
        for i in 0..dim {
            for j in (i + 1)..dim {
                if (matrix[i][j] - matrix[j][i]).abs() > 1e-9 {
                    return None;
                }
            }
        }

        // Cholesky-Banachiewicz, row by row.
        let mut lower = vec![0.0; dim * dim];
        let mut log_det = 0.0;
        for i in 0..dim {
            for j in 0..=i {
                let mut sum = matrix[i][j];
                for k in 0..j {
                    sum -= lower[i * dim + k] * lower[j * dim + k];
                }
                if i == j {
                    if sum <= MIN_CHOLESKY_PIVOT {
                        return None;
                    }
                    let pivot = sum.sqrt();
                    lower[i * dim + j] = pivot;
                    log_det += 2.0 * pivot.ln();
                } else {
                    lower[i * dim + j] = sum / lower[j * dim + j];
                }
            }
        }

        Some(Self {
            dim,
            lower,
            log_det,
        })
    }

    /// Dimension of the factored matrix.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Solves `L y = b` by forward substitution.
    pub fn forward_solve(&self, b: &[f64]) -> Vec<f64> {
        let mut y = vec![0.0; self.dim];
        for i in 0..self.dim {
            let mut sum = b[i];
            for k in 0..i {
                sum -= self.lower[i * self.dim + k] * y[k];
            }
            y[i] = sum / self.lower[i * self.dim + i];
        }
        y
    }

    /// Squared Mahalanobis distance `d' A^-1 d` for a centered vector.
    pub fn mahalanobis_sq(&self, diff: &[f64]) -> f64 {
        self.forward_solve(diff).iter().map(|y| y * y).sum()
    }

    /// Applies the factor to a standard-normal draw, `L z`, yielding a
    /// sample with the factored covariance.
    pub fn correlate(&self, z: &[f64]) -> Vec<f64> {
        let mut x = vec![0.0; self.dim];
        for i in 0..self.dim {
            let mut sum = 0.0;
            for k in 0..=i {
                sum += self.lower[i * self.dim + k] * z[k];
            }
            x[i] = sum;
        }
        x
    }

    /// Log-density of a multivariate Gaussian at `mean + diff`.
    ///
    /// `-0.5 * (k ln 2pi + ln|Sigma| + d' Sigma^-1 d)`.
    pub fn log_density(&self, diff: &[f64]) -> f64 {
        let ln_2pi = (2.0 * std::f64::consts::PI).ln();
        -0.5 * (self.dim as f64 * ln_2pi + self.log_det + self.mahalanobis_sq(diff))
    }
}
