//! Per-feature standardization.

use ndarray::{Array1, Array2, ArrayView1, Axis};

use super::{TrainingError, TrainingResult};

/// Scales below this are treated as zero variance and replaced with 1.
const MIN_SCALE: f64 = 10.0 * f64::EPSILON;

/// Removes the per-feature mean and divides by the population standard
/// deviation, both learned from the training matrix.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Learn mean and scale from the rows of `x`.
    ///
    /// # Errors
    /// Returns `TrainingError::EmptyTrainingSet` if `x` has no rows
    pub fn fit(x: &Array2<f64>) -> TrainingResult<Self> {
        let mean = x.mean_axis(Axis(0)).ok_or(TrainingError::EmptyTrainingSet)?;
        let scale = x
            .var_axis(Axis(0), 0.0)
            .mapv(|v| {
                let std = v.sqrt();
                if std < MIN_SCALE {
                    1.0
                } else {
                    std
                }
            });
        Ok(Self { mean, scale })
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Standardize every row of `x`.
    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.scale
    }

    /// Standardize a single sample.
    pub fn transform_row(&self, row: ArrayView1<'_, f64>) -> Array1<f64> {
        (&row - &self.mean) / &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_transform_zero_mean_unit_variance() {
        let x = array![[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        let scaled = scaler.transform(&x);

        let mean = scaled.mean_axis(Axis(0)).unwrap();
        assert!(mean.iter().all(|m| m.abs() < 1e-12));

        let var = scaled.var_axis(Axis(0), 0.0);
        assert!((var[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_feature_keeps_unit_scale() {
        let x = array![[2.0, 7.0], [4.0, 7.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        let scaled = scaler.transform(&x);
        assert_eq!(scaled.column(1).to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_transform_row_matches_matrix_transform() {
        let x = array![[1.0, 2.0], [3.0, 6.0], [8.0, -1.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        let full = scaler.transform(&x);
        let single = scaler.transform_row(x.row(2));
        assert_eq!(single, full.row(2).to_owned());
    }

    #[test]
    fn test_fit_empty_matrix_fails() {
        let x = Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            StandardScaler::fit(&x),
            Err(TrainingError::EmptyTrainingSet)
        ));
    }
}
