//! Preference model training.
//!
//! A preference model is a fitted [`StandardScaler`] plus a fitted
//! [`LinearSvc`] separating liked papers (positive class) from the current
//! candidate batch (negative class). It is trained from scratch on every call
//! and handed back as a value; nothing is cached between runs.
//!
//! The negative class is "whatever was fetched this time, minus liked papers",
//! so it shifts from run to run and scores are only comparable within a run.

pub mod scaler;
pub mod svm;

use std::fmt;

use ndarray::{Array1, Array2};
use thiserror::Error;
use tracing::{debug, info};

pub use scaler::StandardScaler;
pub use svm::{LinearSvc, SvmParams};

/// Errors that can occur while fitting or applying a preference model.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// Embeddings fed to one call disagree on dimension
    #[error("Embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// An embedding contained NaN or infinity
    #[error("Embedding contains non-finite values")]
    NonFiniteValue,

    /// No rows to fit on
    #[error("Training set is empty")]
    EmptyTrainingSet,

    /// Every sample carries the same label
    #[error("Training data contains a single class")]
    SingleClass,

    /// Solver settings out of range
    #[error("Invalid training parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for training operations.
pub type TrainingResult<T> = Result<T, TrainingError>;

/// Why no model was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The liked-paper store is empty
    NoLikedPapers,
    /// The candidate batch is empty
    NoCandidates,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoLikedPapers => write!(f, "no liked papers"),
            SkipReason::NoCandidates => write!(f, "no candidate papers"),
        }
    }
}

/// Result of a training attempt.
#[derive(Debug, Clone)]
pub enum TrainingOutcome {
    Trained(PreferenceModel),
    Skipped(SkipReason),
}

/// Fitted scaler and classifier, applied together at scoring time.
#[derive(Debug, Clone)]
pub struct PreferenceModel {
    scaler: StandardScaler,
    classifier: LinearSvc,
}

impl PreferenceModel {
    pub fn dimension(&self) -> usize {
        self.scaler.dimension()
    }

    pub fn classifier(&self) -> &LinearSvc {
        &self.classifier
    }

    /// Score one embedding: standardize it, then take the classifier's signed
    /// decision value. Higher means more like the liked papers.
    ///
    /// # Errors
    /// Returns `TrainingError::DimensionMismatch` if the embedding does not
    /// match the dimension the model was trained on
    pub fn decision_function(&self, embedding: &[f32]) -> TrainingResult<f64> {
        if embedding.len() != self.dimension() {
            return Err(TrainingError::DimensionMismatch {
                expected: self.dimension(),
                found: embedding.len(),
            });
        }
        let sample: Array1<f64> = embedding.iter().map(|&v| f64::from(v)).collect();
        let scaled = self.scaler.transform_row(sample.view());
        Ok(self.classifier.decision_function(scaled.view()))
    }
}

/// Fit a preference model on liked embeddings (label 1) and candidate
/// embeddings (label 0).
///
/// An empty side skips training instead of failing, since a one-class problem
/// has no decision boundary.
///
/// # Errors
/// Returns `TrainingError` if the embeddings are inconsistent or the solver
/// rejects its parameters
pub fn train(
    liked: &[Vec<f32>],
    candidates: &[Vec<f32>],
    params: &SvmParams,
) -> TrainingResult<TrainingOutcome> {
    if liked.is_empty() {
        return Ok(TrainingOutcome::Skipped(SkipReason::NoLikedPapers));
    }
    if candidates.is_empty() {
        return Ok(TrainingOutcome::Skipped(SkipReason::NoCandidates));
    }

    let x = stack_rows(liked.iter().chain(candidates))?;
    let labels: Vec<bool> = std::iter::repeat(true)
        .take(liked.len())
        .chain(std::iter::repeat(false).take(candidates.len()))
        .collect();

    debug!(
        positives = liked.len(),
        negatives = candidates.len(),
        dimension = x.ncols(),
        "Fitting preference model"
    );

    let scaler = StandardScaler::fit(&x)?;
    let x_scaled = scaler.transform(&x);
    let classifier = LinearSvc::fit(&x_scaled, &labels, params)?;

    info!(
        positives = liked.len(),
        negatives = candidates.len(),
        iterations = classifier.iterations(),
        "Trained preference model"
    );

    Ok(TrainingOutcome::Trained(PreferenceModel { scaler, classifier }))
}

fn stack_rows<'a>(rows: impl Iterator<Item = &'a Vec<f32>>) -> TrainingResult<Array2<f64>> {
    let mut dimension = None;
    let mut flat = Vec::new();
    let mut n_rows = 0;

    for row in rows {
        let expected = *dimension.get_or_insert(row.len());
        if row.len() != expected {
            return Err(TrainingError::DimensionMismatch {
                expected,
                found: row.len(),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(TrainingError::NonFiniteValue);
        }
        flat.extend(row.iter().map(|&v| f64::from(v)));
        n_rows += 1;
    }

    let dimension = dimension.unwrap_or(0);
    if n_rows == 0 || dimension == 0 {
        return Err(TrainingError::EmptyTrainingSet);
    }
    Array2::from_shape_vec((n_rows, dimension), flat)
        .map_err(|e| TrainingError::InvalidParameter(e.to_string()))
}
