//! Core data models for the paper recommender.
//!
//! Candidate papers and liked papers share one shape: whatever the search
//! service returned at fetch time. Embeddings are attached transiently while a
//! pipeline run is in flight and are never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Metadata for a single research paper.
///
/// The same struct is used for freshly fetched candidates and for papers the
/// user saved to the liked-paper store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paper {
    /// Stable external identifier (the arXiv entry id, e.g.
    /// `http://arxiv.org/abs/2401.01234v1`)
    pub id: String,

    /// Paper title
    pub title: String,

    /// Abstract text
    #[serde(rename = "abstract")]
    pub abstract_text: String,

    /// Last time the upstream service updated this paper
    #[serde(serialize_with = "serialize_rfc3339")]
    pub updated: DateTime<Utc>,

    /// Link to the PDF
    pub url: String,
}

impl Paper {
    /// Text fed to the embedding service: title and abstract joined by a space.
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.title, self.abstract_text)
    }
}

/// Timestamps go over the wire in the same `+00:00` form the store writes.
fn serialize_rfc3339<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339())
}

/// A paper paired with the embedding of its text.
#[derive(Debug, Clone)]
pub struct EmbeddedPaper {
    pub paper: Paper,
    pub embedding: Vec<f32>,
}

/// A candidate paper with its preference score.
///
/// This is the wire shape returned by `GET /papers`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedPaper {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// ISO-8601 timestamp of the last update
    pub published: String,
    /// Signed distance from the classifier's decision boundary
    /// (higher means closer to the liked papers)
    pub score: f64,
}

impl RankedPaper {
    pub fn new(paper: Paper, score: f64) -> Self {
        Self {
            published: paper.updated.to_rfc3339(),
            id: paper.id,
            title: paper.title,
            abstract_text: paper.abstract_text,
            score,
        }
    }
}
