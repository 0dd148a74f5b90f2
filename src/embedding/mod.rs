//! Embedding provider abstraction and implementations.
//!
//! This module defines the interface for text embedding generation and provides
//! implementations for several embedding services (Gemini, OpenAI, local
//! FastEmbed models).
//!
//! [`embed_papers`] is the batched embedder used by the recommendation
//! pipeline: it turns an ordered list of papers into `(paper, embedding)` pairs
//! while respecting upstream batch limits.

pub mod fastembed;
pub mod gemini;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::models::{EmbeddedPaper, Paper};

/// Number of papers submitted per embedding request.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 500;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Network or API communication error
    #[error("API request failed: {0}")]
    ApiError(String),

    /// Invalid input text (e.g., empty, too long)
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Configuration error (e.g., missing API key)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The service returned a different number of embeddings than texts sent
    #[error("Expected {expected} embeddings, received {received}")]
    CountMismatch { expected: usize, received: usize },

    /// Other unexpected errors
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// Implementors of this trait can generate vector embeddings from text inputs.
/// The trait is async to support API-based embedding services.
///
/// # Example Usage
/// ```ignore
/// let provider = GeminiEmbedding::new(api_key, None)?;
/// let embedding = provider.embed("Attention is all you need").await?;
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if the embedding generation fails
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts in a single batch.
    ///
    /// # Returns
    /// A vector of embedding vectors, in the same order as the input texts
    ///
    /// # Errors
    /// Returns `EmbeddingError` if any embedding generation fails
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Get the dimension of embeddings produced by this provider.
    fn dimension(&self) -> usize;

    /// Get the model name/identifier for this provider.
    fn model_name(&self) -> &str;
}

/// Embed an ordered sequence of papers in fixed-size batches.
///
/// Each batch is one `embed_batch` call. The returned embeddings are zipped
/// positionally with the batch, so the output order always matches the input
/// order regardless of where batch boundaries fall.
///
/// # Errors
/// Propagates any provider error, and returns
/// [`EmbeddingError::CountMismatch`] if a batch comes back with a different
/// number of embeddings than texts submitted.
pub async fn embed_papers<E>(
    provider: &E,
    papers: Vec<Paper>,
    batch_size: usize,
) -> EmbeddingResult<Vec<EmbeddedPaper>>
where
    E: EmbeddingProvider + ?Sized,
{
    if batch_size == 0 {
        return Err(EmbeddingError::InvalidInput(
            "batch size must be positive".to_string(),
        ));
    }

    let mut embedded = Vec::with_capacity(papers.len());
    let mut remaining = papers.into_iter().peekable();

    while remaining.peek().is_some() {
        let batch: Vec<Paper> = remaining.by_ref().take(batch_size).collect();
        let texts: Vec<String> = batch.iter().map(Paper::embedding_text).collect();
        let text_refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();

        debug!(
            batch_len = batch.len(),
            model = provider.model_name(),
            "Submitting embedding batch"
        );
        let embeddings = provider.embed_batch(&text_refs).await?;

        if embeddings.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: batch.len(),
                received: embeddings.len(),
            });
        }

        embedded.extend(
            batch
                .into_iter()
                .zip(embeddings)
                .map(|(paper, embedding)| EmbeddedPaper { paper, embedding }),
        );
    }

    Ok(embedded)
}
