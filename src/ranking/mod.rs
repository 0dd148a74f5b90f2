//! Candidate ranking.
//!
//! Scores every embedded candidate with a trained [`PreferenceModel`] and keeps
//! the best `top_n`.

use thiserror::Error;
use tracing::debug;

use crate::models::{EmbeddedPaper, RankedPaper};
use crate::preference::{PreferenceModel, TrainingError};

/// Number of papers returned by a ranking pass unless configured otherwise.
pub const DEFAULT_TOP_N: usize = 100;

/// Errors that can occur while ranking.
#[derive(Debug, Error)]
pub enum RankingError {
    /// The model could not score a candidate
    #[error("Failed to score paper {id}: {source}")]
    Scoring {
        id: String,
        #[source]
        source: TrainingError,
    },
}

/// Result type for ranking operations.
pub type RankingResult<T> = Result<T, RankingError>;

/// Score candidates and return the top `top_n` by descending score.
///
/// The sort is stable and uses a total order on `f64`, so equal scores keep
/// their input order.
///
/// # Errors
/// Returns `RankingError::Scoring` if any candidate's embedding does not fit
/// the model
pub fn rank(
    model: &PreferenceModel,
    candidates: Vec<EmbeddedPaper>,
    top_n: usize,
) -> RankingResult<Vec<RankedPaper>> {
    let mut scored = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let score = model
            .decision_function(&candidate.embedding)
            .map_err(|source| RankingError::Scoring {
                id: candidate.paper.id.clone(),
                source,
            })?;
        scored.push(RankedPaper::new(candidate.paper, score));
    }

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_n);

    debug!(
        returned = scored.len(),
        best = scored.first().map(|p| p.score),
        "Ranked candidates"
    );
    Ok(scored)
}
