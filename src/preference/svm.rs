//! Linear support vector classifier.
//!
//! Squared hinge loss with an L2 penalty, solved in the dual by coordinate
//! descent. The intercept is learned as the weight of a constant feature equal
//! to 1, so it is regularized along with the other weights.

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, warn};

use super::{TrainingError, TrainingResult};

/// Solver settings.
#[derive(Debug, Clone)]
pub struct SvmParams {
    /// Inverse regularization strength
    pub c: f64,

    /// Stop once the projected-gradient spread drops to this value
    pub tol: f64,

    /// Upper bound on passes over the data
    pub max_iter: usize,

    /// Seed for the per-epoch sample order
    pub seed: u64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 0.01,
            tol: 1e-4,
            max_iter: 1000,
            seed: 0,
        }
    }
}

/// A fitted linear classifier.
#[derive(Debug, Clone)]
pub struct LinearSvc {
    weights: Array1<f64>,
    intercept: f64,
    iterations: usize,
    converged: bool,
}

impl LinearSvc {
    /// Fit on the rows of `x` with boolean labels (`true` is the positive
    /// class). Classes are weighted by `n_samples / (2 * n_class)`.
    ///
    /// # Errors
    /// Returns `TrainingError` if the label count does not match the rows,
    /// only one class is present, or the parameters are out of range
    pub fn fit(x: &Array2<f64>, labels: &[bool], params: &SvmParams) -> TrainingResult<Self> {
        let n_samples = x.nrows();
        if labels.len() != n_samples {
            return Err(TrainingError::InvalidParameter(format!(
                "{} labels for {} samples",
                labels.len(),
                n_samples
            )));
        }
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(params.c) || !positive(params.tol) || params.max_iter == 0 {
            return Err(TrainingError::InvalidParameter(format!(
                "C and tol must be positive and max_iter non-zero, got {:?}",
                params
            )));
        }

        let n_positive = labels.iter().filter(|&&l| l).count();
        let n_negative = n_samples - n_positive;
        if n_positive == 0 || n_negative == 0 {
            return Err(TrainingError::SingleClass);
        }

        let weight_pos = n_samples as f64 / (2.0 * n_positive as f64);
        let weight_neg = n_samples as f64 / (2.0 * n_negative as f64);

        let y: Vec<f64> = labels.iter().map(|&l| if l { 1.0 } else { -1.0 }).collect();
        let diag: Vec<f64> = labels
            .iter()
            .map(|&l| {
                let c_i = params.c * if l { weight_pos } else { weight_neg };
                0.5 / c_i
            })
            .collect();
        let q_diag: Vec<f64> = x
            .rows()
            .into_iter()
            .zip(&diag)
            .map(|(row, d)| row.dot(&row) + 1.0 + d)
            .collect();

        let mut alpha = vec![0.0_f64; n_samples];
        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut intercept = 0.0_f64;
        let mut order: Vec<usize> = (0..n_samples).collect();
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut iterations = 0;
        let mut converged = false;
        while iterations < params.max_iter {
            iterations += 1;
            order.shuffle(&mut rng);

            let mut pg_max = f64::NEG_INFINITY;
            let mut pg_min = f64::INFINITY;

            for &i in &order {
                let row = x.row(i);
                let gradient = y[i] * (row.dot(&weights) + intercept) - 1.0 + alpha[i] * diag[i];

                // alpha has a lower bound of 0 and no upper bound
                let projected = if alpha[i] == 0.0 {
                    gradient.min(0.0)
                } else {
                    gradient
                };
                pg_max = pg_max.max(projected);
                pg_min = pg_min.min(projected);

                if projected.abs() > 1e-12 {
                    let previous = alpha[i];
                    alpha[i] = (previous - gradient / q_diag[i]).max(0.0);
                    let step = (alpha[i] - previous) * y[i];
                    weights.scaled_add(step, &row);
                    intercept += step;
                }
            }

            if pg_max - pg_min <= params.tol {
                converged = true;
                break;
            }
        }

        if converged {
            debug!(iterations, "Linear SVC converged");
        } else {
            warn!(
                max_iter = params.max_iter,
                "Linear SVC did not converge, using the last iterate"
            );
        }

        Ok(Self {
            weights,
            intercept,
            iterations,
            converged,
        })
    }

    /// Signed distance-like score; positive means the liked side.
    pub fn decision_function(&self, sample: ArrayView1<'_, f64>) -> f64 {
        sample.dot(&self.weights) + self.intercept
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }
}
