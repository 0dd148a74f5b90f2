//! Recommendation pipeline.
//!
//! Orchestrates one personalization pass: fetch candidates, embed them and the
//! liked papers, train a preference model, and rank. It also owns the two
//! write paths into the liked-paper store (saving a paper by id and seeding an
//! empty store).
//!
//! # Example
//! ```ignore
//! use paper_recommender::pipeline::{PipelineConfig, RecommendationPipeline};
//! use paper_recommender::provider::arxiv::{ArxivClient, ArxivConfig};
//! use paper_recommender::embedding::gemini::GeminiEmbedding;
//! use paper_recommender::storage::sqlite::SqliteStorage;
//!
//! let pipeline = RecommendationPipeline::new(
//!     ArxivClient::new(ArxivConfig::default())?,
//!     GeminiEmbedding::new(api_key, None)?,
//!     SqliteStorage::new("papers.db"),
//!     PipelineConfig::default(),
//! );
//! pipeline.initialize().await?;
//! let recommendations = pipeline.recommend().await?;
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::embedding::{embed_papers, EmbeddingError, EmbeddingProvider, DEFAULT_EMBED_BATCH_SIZE};
use crate::models::{Paper, RankedPaper};
use crate::preference::{self, SkipReason, SvmParams, TrainingError, TrainingOutcome};
use crate::provider::candidates::{fetch_candidates, CandidateStats};
use crate::provider::{
    FetchCompleteness, PaperProvider, ProviderError, RecentPapersRequest, DEFAULT_CATEGORIES,
};
use crate::ranking::{rank, RankingError, DEFAULT_TOP_N};
use crate::storage::{LikedPaperStore, StorageError};

/// Paper saved into an empty store on first start.
pub const SEED_PAPER_ID: &str = "1603.02754";

/// Errors that can occur while running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The search service failed
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The embedding service failed
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// The liked-paper store failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Model fitting failed
    #[error("Training error: {0}")]
    Training(#[from] TrainingError),

    /// Scoring failed
    #[error("Ranking error: {0}")]
    Ranking(#[from] RankingError),

    /// Caller passed unusable input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Candidates requested from the search service per run
    pub candidates: usize,

    /// Skip candidates last updated more than this many days ago
    pub max_age_days: Option<u32>,

    /// Search categories
    pub categories: Vec<String>,

    /// Papers per embedding request
    pub embed_batch_size: usize,

    /// Papers returned per run
    pub top_n: usize,

    /// Paper saved when the store is empty at startup; `None` disables seeding
    pub seed_paper_id: Option<String>,

    pub svm: SvmParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            candidates: 500,
            max_age_days: None,
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            top_n: DEFAULT_TOP_N,
            seed_paper_id: Some(SEED_PAPER_ID.to_string()),
            svm: SvmParams::default(),
        }
    }
}

/// Whether a run produced scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationStatus {
    /// A model was trained and candidates were ranked
    Ranked,
    /// Training was skipped; no papers are returned
    Untrained(SkipReason),
}

/// Output of one pipeline run.
#[derive(Debug, Clone)]
pub struct Recommendations {
    /// Ranked papers, best first; empty when untrained
    pub papers: Vec<RankedPaper>,
    pub status: RecommendationStatus,
    /// Whether the candidate listing finished
    pub completeness: FetchCompleteness,
    pub stats: CandidateStats,
}

/// Recommendation pipeline coordinator.
///
/// Holds no per-run state: every call to [`recommend`](Self::recommend) trains
/// its own model, so a shared pipeline can serve concurrent requests.
pub struct RecommendationPipeline<P, E, S> {
    provider: P,
    embedder: E,
    store: S,
    config: PipelineConfig,
}

impl<P, E, S> RecommendationPipeline<P, E, S> {
    pub fn new(provider: P, embedder: E, store: S, config: PipelineConfig) -> Self {
        Self {
            provider,
            embedder,
            store,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

// The liked-set operations never embed anything, so they do not constrain `E`.
impl<P, E, S> RecommendationPipeline<P, E, S>
where
    P: PaperProvider,
    S: LikedPaperStore,
{
    /// Prepare the store and seed it if empty.
    ///
    /// A failed seed is logged and otherwise ignored; the store is still
    /// usable and the user can save papers by hand.
    ///
    /// # Errors
    /// Returns `PipelineError::Storage` if the schema cannot be created
    pub async fn initialize(&self) -> PipelineResult<()> {
        self.store.initialize().await?;
        if let Err(e) = self.seed_if_empty().await {
            error!(error = %e, "Failed to add seed paper");
        }
        Ok(())
    }

    /// Save the configured seed paper when the store holds nothing.
    ///
    /// # Returns
    /// The seeded paper, or `None` if the store already had papers, seeding is
    /// disabled, or the seed id did not resolve
    pub async fn seed_if_empty(&self) -> PipelineResult<Option<Paper>> {
        let Some(seed_id) = self.config.seed_paper_id.as_deref() else {
            return Ok(None);
        };
        if self.store.count().await? > 0 {
            return Ok(None);
        }

        match self.provider.fetch_by_id(seed_id).await? {
            Some(paper) => {
                self.store.upsert(&paper).await?;
                info!(id = %paper.id, title = %paper.title, "Added seed paper");
                Ok(Some(paper))
            }
            None => {
                warn!(seed_id, "Seed paper not found");
                Ok(None)
            }
        }
    }

    /// Look a paper up by id and add it to the liked set.
    ///
    /// Saving the same paper again replaces the stored record with the latest
    /// metadata.
    ///
    /// # Returns
    /// The saved paper, or `None` if the id did not resolve
    ///
    /// # Errors
    /// Returns `PipelineError::InvalidInput` for a blank id, or the provider or
    /// store error
    pub async fn save_paper(&self, paper_id: &str) -> PipelineResult<Option<Paper>> {
        let paper_id = paper_id.trim();
        if paper_id.is_empty() {
            return Err(PipelineError::InvalidInput(
                "paper_id must not be empty".to_string(),
            ));
        }

        let Some(paper) = self.provider.fetch_by_id(paper_id).await? else {
            info!(paper_id, "Paper not found");
            return Ok(None);
        };
        self.store.upsert(&paper).await?;
        info!(id = %paper.id, title = %paper.title, "Saved paper");
        Ok(Some(paper))
    }

    /// All liked papers, ordered by id.
    pub async fn liked_papers(&self) -> PipelineResult<Vec<Paper>> {
        Ok(self.store.list_all().await?)
    }
}

impl<P, E, S> RecommendationPipeline<P, E, S>
where
    P: PaperProvider,
    E: EmbeddingProvider,
    S: LikedPaperStore,
{
    /// Run one recommendation pass using the current time for the age cutoff.
    pub async fn recommend(&self) -> PipelineResult<Recommendations> {
        self.recommend_at(Utc::now()).await
    }

    /// Run one recommendation pass.
    ///
    /// When there are no liked papers or no candidates, training is skipped
    /// and the result carries [`RecommendationStatus::Untrained`] with no
    /// papers.
    ///
    /// # Errors
    /// Any provider, embedding, storage, training or ranking failure aborts
    /// the run
    pub async fn recommend_at(&self, now: DateTime<Utc>) -> PipelineResult<Recommendations> {
        let request = RecentPapersRequest {
            categories: self.config.categories.clone(),
            max_results: self.config.candidates,
        };
        let liked = self.store.list_all().await?;
        let liked_ids: HashSet<String> = liked.iter().map(|p| p.id.clone()).collect();
        let batch = fetch_candidates(
            &self.provider,
            &liked_ids,
            &request,
            self.config.max_age_days,
            now,
        )
        .await?;

        let skip = if liked.is_empty() {
            Some(SkipReason::NoLikedPapers)
        } else if batch.papers.is_empty() {
            Some(SkipReason::NoCandidates)
        } else {
            None
        };
        if let Some(reason) = skip {
            warn!(%reason, "Skipping training, no model available");
            return Ok(Recommendations {
                papers: Vec::new(),
                status: RecommendationStatus::Untrained(reason),
                completeness: batch.completeness,
                stats: batch.stats,
            });
        }

        let batch_size = self.config.embed_batch_size;
        let candidates = embed_papers(&self.embedder, batch.papers, batch_size).await?;
        let liked = embed_papers(&self.embedder, liked, batch_size).await?;
        info!(
            candidates = candidates.len(),
            liked = liked.len(),
            model = self.embedder.model_name(),
            "Embedded papers"
        );

        let liked_vectors: Vec<Vec<f32>> = liked.into_iter().map(|e| e.embedding).collect();
        let candidate_vectors: Vec<Vec<f32>> =
            candidates.iter().map(|e| e.embedding.clone()).collect();

        let model = match preference::train(&liked_vectors, &candidate_vectors, &self.config.svm)? {
            TrainingOutcome::Trained(model) => model,
            TrainingOutcome::Skipped(reason) => {
                warn!(%reason, "Skipping training, no model available");
                return Ok(Recommendations {
                    papers: Vec::new(),
                    status: RecommendationStatus::Untrained(reason),
                    completeness: batch.completeness,
                    stats: batch.stats,
                });
            }
        };

        let papers = rank(&model, candidates, self.config.top_n)?;
        info!(returned = papers.len(), "Ranked recommendations");

        Ok(Recommendations {
            papers,
            status: RecommendationStatus::Ranked,
            completeness: batch.completeness,
            stats: batch.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixed_now, paper, MemoryStore, MockEmbedding, MockProvider};

    fn pipeline(
        provider: MockProvider,
        embedder: MockEmbedding,
        store: MemoryStore,
    ) -> RecommendationPipeline<MockProvider, MockEmbedding, MemoryStore> {
        RecommendationPipeline::new(provider, embedder, store, PipelineConfig::default())
    }

    #[tokio::test]
    async fn test_empty_store_skips_training() {
        let provider = MockProvider::with_recent(vec![
            paper("2406.00001v1", "graph"),
            paper("2406.00002v1", "vision"),
            paper("2406.00003v1", "speech"),
        ]);
        let embedder = MockEmbedding::default();
        let pipeline = pipeline(provider, embedder.clone(), MemoryStore::default());

        let result = pipeline.recommend_at(fixed_now()).await.unwrap();

        assert!(result.papers.is_empty());
        assert_eq!(
            result.status,
            RecommendationStatus::Untrained(SkipReason::NoLikedPapers)
        );
        assert_eq!(result.stats.fetched, 3);
        assert_eq!(embedder.batch_calls(), 0);
    }

    #[tokio::test]
    async fn test_no_candidates_skips_training() {
        let liked = paper("1603.02754v3", "graph");
        let provider = MockProvider::with_recent(vec![liked.clone()]);
        let store = MemoryStore::with_papers(vec![liked]);

        let result = pipeline(provider, MockEmbedding::default(), store)
            .recommend_at(fixed_now())
            .await
            .unwrap();

        assert_eq!(
            result.status,
            RecommendationStatus::Untrained(SkipReason::NoCandidates)
        );
        assert_eq!(result.stats.already_liked, 1);
    }

    #[tokio::test]
    async fn test_recommend_ranks_liked_topic_first() {
        let provider = MockProvider::with_recent(vec![
            paper("2406.00001v1", "vision"),
            paper("2406.00002v1", "graph graph"),
            paper("2406.00003v1", "speech"),
            paper("2406.00004v1", "vision"),
            paper("2406.00005v1", "graph"),
        ]);
        let store = MemoryStore::with_papers(vec![
            paper("2301.00001v1", "graph graph"),
            paper("2301.00002v1", "graph"),
        ]);

        let result = pipeline(provider, MockEmbedding::default(), store)
            .recommend_at(fixed_now())
            .await
            .unwrap();

        assert_eq!(result.status, RecommendationStatus::Ranked);
        assert_eq!(result.completeness, FetchCompleteness::Complete);
        assert_eq!(result.papers.len(), 5);
        assert!(result.papers.iter().all(|p| p.score.is_finite()));
        assert!(result.papers.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(result.papers[0].title.starts_with("graph"));
        assert!(result.papers[1].title.starts_with("graph"));
    }

    #[tokio::test]
    async fn test_recommend_reads_liked_set_once() {
        let liked = paper("2301.00001v1", "graph");
        let provider = MockProvider::with_recent(vec![
            liked.clone(),
            paper("2406.00001v1", "graph"),
            paper("2406.00002v1", "vision"),
        ]);
        let store = MemoryStore::with_papers(vec![liked.clone()]);

        let result = pipeline(provider, MockEmbedding::default(), store.clone())
            .recommend_at(fixed_now())
            .await
            .unwrap();

        assert_eq!(store.reads(), 1);
        assert_eq!(result.stats.already_liked, 1);
        assert_eq!(result.papers.len(), 2);
        assert!(result.papers.iter().all(|p| p.id != liked.id));
    }

    #[tokio::test]
    async fn test_recommend_respects_top_n_and_truncation() {
        let recent = (0..12)
            .map(|i| paper(&format!("2406.{:05}v1", i), if i % 2 == 0 { "graph" } else { "vision" }))
            .collect();
        let provider = MockProvider::with_recent(recent).truncated();
        let store = MemoryStore::with_papers(vec![paper("2301.00001v1", "graph")]);
        let config = PipelineConfig {
            top_n: 4,
            ..PipelineConfig::default()
        };

        let result = RecommendationPipeline::new(provider, MockEmbedding::default(), store, config)
            .recommend_at(fixed_now())
            .await
            .unwrap();

        assert_eq!(result.papers.len(), 4);
        assert_eq!(result.completeness, FetchCompleteness::Truncated);
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let provider = MockProvider::with_recent(vec![paper("2406.00001v1", "graph")]);
        let store = MemoryStore::with_papers(vec![paper("2301.00001v1", "graph")]);

        let result = pipeline(provider, MockEmbedding::failing(), store)
            .recommend_at(fixed_now())
            .await;

        assert!(matches!(result, Err(PipelineError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_save_paper_is_idempotent_and_keeps_latest() {
        let original = paper("2401.00001v1", "graph");
        let provider = MockProvider::default().with_lookup("2401.00001", original.clone());
        let store = MemoryStore::default();
        let pipeline = pipeline(provider.clone(), MockEmbedding::default(), store.clone());

        pipeline.save_paper("2401.00001").await.unwrap().unwrap();

        let mut revised = original.clone();
        revised.title = "graph study, revised".to_string();
        provider.set_lookup("2401.00001", revised.clone());
        let saved = pipeline.save_paper(" 2401.00001 ").await.unwrap().unwrap();

        assert_eq!(saved, revised);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get(&original.id).unwrap().title, "graph study, revised");
    }

    #[tokio::test]
    async fn test_save_unknown_paper_returns_none() {
        let store = MemoryStore::default();
        let pipeline = pipeline(MockProvider::default(), MockEmbedding::default(), store.clone());

        assert!(pipeline.save_paper("9999.99999").await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_blank_id_is_invalid() {
        let pipeline = pipeline(
            MockProvider::default(),
            MockEmbedding::default(),
            MemoryStore::default(),
        );
        assert!(matches!(
            pipeline.save_paper("   ").await,
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_initialize_seeds_empty_store_once() {
        let seed = paper("1603.02754v3", "graph");
        let provider = MockProvider::default().with_lookup(SEED_PAPER_ID, seed.clone());
        let store = MemoryStore::default();
        let pipeline = pipeline(provider.clone(), MockEmbedding::default(), store.clone());

        pipeline.initialize().await.unwrap();
        pipeline.initialize().await.unwrap();

        assert_eq!(store.list_all().await.unwrap(), vec![seed]);
        assert_eq!(provider.lookups(), vec![SEED_PAPER_ID.to_string()]);
    }

    #[tokio::test]
    async fn test_initialize_tolerates_missing_seed() {
        let store = MemoryStore::default();
        let pipeline = pipeline(MockProvider::default(), MockEmbedding::default(), store.clone());

        pipeline.initialize().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_liked_papers_lists_store() {
        let store = MemoryStore::with_papers(vec![
            paper("2402.00002v1", "vision"),
            paper("2402.00001v1", "graph"),
        ]);
        let pipeline = pipeline(MockProvider::default(), MockEmbedding::default(), store);

        let liked = pipeline.liked_papers().await.unwrap();
        let ids: Vec<&str> = liked.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["http://arxiv.org/abs/2402.00001v1", "http://arxiv.org/abs/2402.00002v1"]
        );
    }
}
