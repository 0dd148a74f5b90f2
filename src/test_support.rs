//! In-memory stand-ins for the provider, embedder and store, shared by the
//! pipeline and HTTP tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::embedding::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
use crate::models::Paper;
use crate::provider::{FetchOutcome, PaperProvider, ProviderResult, RecentPapersRequest};
use crate::storage::{LikedPaperStore, StorageResult};

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

/// A paper whose title carries a topic word the mock embedder keys on.
pub fn paper(id: &str, topic: &str) -> Paper {
    Paper {
        id: format!("http://arxiv.org/abs/{}", id),
        title: format!("{} study {}", topic, id),
        abstract_text: format!("An abstract about {}.", topic),
        updated: fixed_now() - Duration::hours(1),
        url: format!("http://arxiv.org/pdf/{}", id),
    }
}

#[derive(Default)]
struct ProviderState {
    recent: Vec<Paper>,
    truncated: bool,
    by_id: HashMap<String, Paper>,
    lookups: Vec<String>,
}

/// Provider serving a fixed listing and a fixed id table.
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl MockProvider {
    pub fn with_recent(papers: Vec<Paper>) -> Self {
        let provider = Self::default();
        provider.state.lock().unwrap().recent = papers;
        provider
    }

    pub fn truncated(self) -> Self {
        self.state.lock().unwrap().truncated = true;
        self
    }

    /// Register a paper under a lookup key (a bare id such as `2401.00001`).
    pub fn with_lookup(self, key: &str, paper: Paper) -> Self {
        self.state.lock().unwrap().by_id.insert(key.to_string(), paper);
        self
    }

    pub fn set_lookup(&self, key: &str, paper: Paper) {
        self.state.lock().unwrap().by_id.insert(key.to_string(), paper);
    }

    pub fn lookups(&self) -> Vec<String> {
        self.state.lock().unwrap().lookups.clone()
    }
}

#[async_trait]
impl PaperProvider for MockProvider {
    async fn fetch_recent(&self, request: &RecentPapersRequest) -> ProviderResult<FetchOutcome> {
        let state = self.state.lock().unwrap();
        let papers: Vec<Paper> = state.recent.iter().take(request.max_results).cloned().collect();
        Ok(if state.truncated {
            FetchOutcome::truncated(papers)
        } else {
            FetchOutcome::complete(papers)
        })
    }

    async fn fetch_by_id(&self, paper_id: &str) -> ProviderResult<Option<Paper>> {
        let mut state = self.state.lock().unwrap();
        state.lookups.push(paper_id.to_string());
        Ok(state.by_id.get(paper_id).cloned())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Default)]
struct EmbeddingState {
    batch_calls: usize,
    fail: bool,
}

/// Embeds text into a 3-dimensional topic space: counts of "graph", "vision"
/// and "speech", plus a small length term so no column is constant.
#[derive(Clone, Default)]
pub struct MockEmbedding {
    state: Arc<Mutex<EmbeddingState>>,
}

impl MockEmbedding {
    pub fn failing() -> Self {
        let embedding = Self::default();
        embedding.state.lock().unwrap().fail = true;
        embedding
    }

    pub fn batch_calls(&self) -> usize {
        self.state.lock().unwrap().batch_calls
    }

    fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let count = |word: &str| lower.matches(word).count() as f32;
        vec![
            count("graph"),
            count("vision"),
            count("speech") + text.len() as f32 / 1000.0,
        ]
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedding {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut state = self.state.lock().unwrap();
        state.batch_calls += 1;
        if state.fail {
            return Err(EmbeddingError::ApiError("mock embedding outage".to_string()));
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        3
    }

    fn model_name(&self) -> &str {
        "mock-topics"
    }
}

/// Liked-paper store backed by a map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    papers: Arc<Mutex<HashMap<String, Paper>>>,
    reads: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn with_papers(papers: Vec<Paper>) -> Self {
        let store = Self::default();
        {
            let mut map = store.papers.lock().unwrap();
            for paper in papers {
                map.insert(paper.id.clone(), paper);
            }
        }
        store
    }

    pub fn get(&self, id: &str) -> Option<Paper> {
        self.papers.lock().unwrap().get(id).cloned()
    }

    /// Number of `list_all` calls, including those made through `liked_ids`.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LikedPaperStore for MemoryStore {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn list_all(&self) -> StorageResult<Vec<Paper>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut papers: Vec<Paper> = self.papers.lock().unwrap().values().cloned().collect();
        papers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(papers)
    }

    async fn upsert(&self, paper: &Paper) -> StorageResult<()> {
        self.papers
            .lock()
            .unwrap()
            .insert(paper.id.clone(), paper.clone());
        Ok(())
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.papers.lock().unwrap().len())
    }
}
