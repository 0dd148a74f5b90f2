//! Candidate fetching.
//!
//! Pulls the most recent papers from a [`PaperProvider`], applies the optional
//! recency cutoff, and removes anything in the caller's liked-id snapshot. The
//! result is the negative class for one training run.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::{FetchCompleteness, PaperProvider, ProviderResult, RecentPapersRequest};
use crate::models::Paper;

/// Counters describing one fetch, for logging and CLI output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandidateStats {
    /// Papers returned by the provider
    pub fetched: usize,
    /// Papers dropped by the recency cutoff
    pub too_old: usize,
    /// Papers dropped because they are already liked
    pub already_liked: usize,
}

/// The candidate batch for one pipeline run.
#[derive(Debug, Clone)]
pub struct CandidateBatch {
    /// Newest-updated first
    pub papers: Vec<Paper>,
    pub completeness: FetchCompleteness,
    pub stats: CandidateStats,
}

/// Fetch the candidate batch.
///
/// Papers updated before `now - max_age_days` are skipped. The recency filter
/// runs over the provider's window of `request.max_results` papers, so fewer
/// than `max_results` candidates may come back. Every paper whose id is in
/// `liked_ids` is dropped; pass the same snapshot the positive class is built
/// from so the two sets stay disjoint.
///
/// # Errors
/// Returns the provider's error. A truncated listing is not an error; it is
/// reported through `completeness`.
pub async fn fetch_candidates<P>(
    provider: &P,
    liked_ids: &HashSet<String>,
    request: &RecentPapersRequest,
    max_age_days: Option<u32>,
    now: DateTime<Utc>,
) -> ProviderResult<CandidateBatch>
where
    P: PaperProvider + ?Sized,
{
    let outcome = provider.fetch_recent(request).await?;
    let mut stats = CandidateStats {
        fetched: outcome.papers.len(),
        ..CandidateStats::default()
    };

    let cutoff = max_age_days.map(|days| now - Duration::days(i64::from(days)));

    let mut papers = Vec::with_capacity(outcome.papers.len());
    for paper in outcome.papers {
        if cutoff.is_some_and(|cutoff| paper.updated < cutoff) {
            stats.too_old += 1;
            continue;
        }
        if liked_ids.contains(&paper.id) {
            stats.already_liked += 1;
            continue;
        }
        papers.push(paper);
    }

    info!(
        provider = provider.name(),
        fetched = stats.fetched,
        too_old = stats.too_old,
        already_liked = stats.already_liked,
        candidates = papers.len(),
        truncated = outcome.completeness == FetchCompleteness::Truncated,
        "Retrieved candidate papers"
    );

    Ok(CandidateBatch {
        papers,
        completeness: outcome.completeness,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FetchOutcome;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct FixedProvider {
        outcome: FetchOutcome,
        requests: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl PaperProvider for FixedProvider {
        async fn fetch_recent(&self, request: &RecentPapersRequest) -> ProviderResult<FetchOutcome> {
            self.requests.lock().unwrap().push(request.max_results);
            Ok(self.outcome.clone())
        }

        async fn fetch_by_id(&self, _paper_id: &str) -> ProviderResult<Option<Paper>> {
            Ok(None)
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn paper(id: &str, days_old: i64) -> Paper {
        Paper {
            id: format!("http://arxiv.org/abs/{}", id),
            title: format!("Paper {}", id),
            abstract_text: String::new(),
            updated: now() - Duration::days(days_old),
            url: String::new(),
        }
    }

    fn provider(outcome: FetchOutcome) -> FixedProvider {
        FixedProvider {
            outcome,
            requests: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_liked_papers_never_appear_in_candidates() {
        let liked = paper("2406.00002v1", 1);
        let provider = provider(FetchOutcome::complete(vec![
            paper("2406.00001v1", 0),
            liked.clone(),
            paper("2406.00003v1", 2),
        ]));
        let liked_ids = HashSet::from([liked.id.clone()]);

        let batch = fetch_candidates(&provider, &liked_ids, &RecentPapersRequest::new(500), None, now())
            .await
            .unwrap();

        assert_eq!(batch.papers.len(), 2);
        assert!(batch.papers.iter().all(|p| p.id != liked.id));
        assert_eq!(batch.stats.already_liked, 1);
        assert_eq!(batch.stats.fetched, 3);
        assert_eq!(*provider.requests.lock().unwrap(), vec![500]);
    }

    #[tokio::test]
    async fn test_age_cutoff_skips_old_papers_and_keeps_order() {
        let provider = provider(FetchOutcome::complete(vec![
            paper("a", 0),
            paper("b", 3),
            paper("c", 8),
            paper("d", 1),
        ]));
        let liked_ids = HashSet::new();

        let batch = fetch_candidates(&provider, &liked_ids, &RecentPapersRequest::new(10), Some(7), now())
            .await
            .unwrap();

        let ids: Vec<&str> = batch.papers.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(ids, vec!["Paper a", "Paper b", "Paper d"]);
        assert_eq!(batch.stats.too_old, 1);
    }

    #[tokio::test]
    async fn test_truncated_listing_is_passed_through() {
        let provider = provider(FetchOutcome::truncated(vec![paper("a", 0)]));
        let liked_ids = HashSet::new();

        let batch = fetch_candidates(&provider, &liked_ids, &RecentPapersRequest::new(500), None, now())
            .await
            .unwrap();

        assert_eq!(batch.completeness, FetchCompleteness::Truncated);
        assert_eq!(batch.papers.len(), 1);
    }
}
