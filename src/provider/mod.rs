//! Paper provider module.
//!
//! This module defines the interface for sourcing paper metadata from a
//! literature search service, along with the arXiv implementation and the
//! candidate fetcher that turns raw search results into the negative training
//! batch.
//!
//! The `PaperProvider` trait isolates the search service's response shape from
//! the rest of the pipeline: implementations hand back typed [`Paper`] values
//! and say explicitly whether the listing finished or was cut short.

pub mod arxiv;
pub mod candidates;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Paper;

/// Default topical categories for candidate papers.
pub const DEFAULT_CATEGORIES: [&str; 5] = ["cs.LG", "stat.ML", "cs.AI", "cs.CL", "cs.IR"];

/// Errors that can occur when fetching papers from a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to parse the data format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The service answered with a non-success status
    #[error("Upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Other provider-specific errors
    #[error("Provider error: {0}")]
    Other(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Whether a listing ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchCompleteness {
    /// Every requested result (or every available result) was retrieved
    Complete,
    /// The service returned an unexpected empty page mid-listing; the papers
    /// collected before it are still returned
    Truncated,
}

/// Papers returned by one listing call.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Papers in the order the service returned them
    pub papers: Vec<Paper>,
    pub completeness: FetchCompleteness,
}

impl FetchOutcome {
    pub fn complete(papers: Vec<Paper>) -> Self {
        Self {
            papers,
            completeness: FetchCompleteness::Complete,
        }
    }

    pub fn truncated(papers: Vec<Paper>) -> Self {
        Self {
            papers,
            completeness: FetchCompleteness::Truncated,
        }
    }
}

/// Parameters for listing recent papers.
#[derive(Debug, Clone)]
pub struct RecentPapersRequest {
    /// Category codes to search (OR-ed together)
    pub categories: Vec<String>,

    /// Upper bound on papers pulled from the service
    pub max_results: usize,
}

impl RecentPapersRequest {
    pub fn new(max_results: usize) -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            max_results,
        }
    }
}

/// Trait for literature search services.
///
/// Providers are responsible for their own pagination; callers see a single
/// ordered list.
#[async_trait]
pub trait PaperProvider: Send + Sync {
    /// List the most recently updated papers in the requested categories,
    /// newest first, at most `request.max_results` of them.
    ///
    /// # Errors
    /// Returns `ProviderError` if papers cannot be fetched or parsed. An
    /// unexpected empty page is not an error; it yields
    /// [`FetchCompleteness::Truncated`].
    async fn fetch_recent(&self, request: &RecentPapersRequest) -> ProviderResult<FetchOutcome>;

    /// Look up a single paper by its identifier.
    ///
    /// # Returns
    /// `None` if the identifier does not resolve to a paper
    async fn fetch_by_id(&self, paper_id: &str) -> ProviderResult<Option<Paper>>;

    /// Get a human-readable name of this provider, for logging.
    fn name(&self) -> &str;
}
