//! Paper Recommender - personalized ranking of recent research papers.
//!
//! This library learns what a user likes from a small set of saved papers and
//! ranks freshly published candidates against it.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (Paper, EmbeddedPaper, RankedPaper)
//! - **provider**: Literature search (arXiv client, candidate fetching)
//! - **embedding**: Text embedding providers and the batched embedder
//! - **storage**: The liked-paper store (SQLite-based)
//! - **preference**: Feature scaling and linear SVM training
//! - **ranking**: Scoring and top-N selection
//! - **pipeline**: The end-to-end recommendation pass
//! - **server**: HTTP interface
//!
//! # Workflow
//!
//! Every recommendation request runs the whole loop from scratch:
//!
//! 1. Fetch the most recently updated papers in the configured categories
//! 2. Drop papers the user already liked (and, optionally, stale papers)
//! 3. Embed the title and abstract of every candidate and every liked paper
//! 4. Standardize the embeddings and fit a linear SVM, liked vs. candidates
//! 5. Score each candidate with the SVM decision function
//! 6. Return the top-N by descending score
//!
//! # Example
//!
//! ```ignore
//! use paper_recommender::{
//!     embedding::gemini::GeminiEmbedding,
//!     pipeline::{PipelineConfig, RecommendationPipeline},
//!     provider::arxiv::{ArxivClient, ArxivConfig},
//!     storage::sqlite::SqliteStorage,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = RecommendationPipeline::new(
//!         ArxivClient::new(ArxivConfig::default())?,
//!         GeminiEmbedding::new(std::env::var("GEMINI_API_KEY")?, None)?,
//!         SqliteStorage::new("papers.db"),
//!         PipelineConfig::default(),
//!     );
//!     pipeline.initialize().await?;
//!
//!     let recommendations = pipeline.recommend().await?;
//!     for paper in recommendations.papers {
//!         println!("{:.4}  {}", paper.score, paper.title);
//!     }
//!
//!     Ok(())
//! }
//! ```

// Public modules
pub mod embedding;
pub mod models;
pub mod pipeline;
pub mod preference;
pub mod provider;
pub mod ranking;
pub mod server;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types at the crate root
pub use embedding::EmbeddingProvider;
pub use models::{EmbeddedPaper, Paper, RankedPaper};
pub use pipeline::{PipelineConfig, RecommendationPipeline, Recommendations};
pub use provider::PaperProvider;
pub use storage::LikedPaperStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
