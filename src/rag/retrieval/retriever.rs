//! Vector retriever for one source
//!
//! Wraps a `VectorIndex` with a per-call timeout and turns every outcome
//! into a `RetrievalResult`. `retrieve` never returns an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::CacheManager;
use crate::rag::retrieval::index::VectorIndex;
use crate::types::{Candidate, RetrievalResult, SourceKind};

/// Retriever bound to one logical source ("documents" or "faq")
#[derive(Clone)]
pub struct VectorRetriever {
    source: SourceKind,
    index: Arc<dyn VectorIndex>,
    timeout: Duration,
    cache: Option<Arc<CacheManager>>,
}

impl VectorRetriever {
    pub fn new(source: SourceKind, index: Arc<dyn VectorIndex>, timeout: Duration) -> Self {
        Self {
            source,
            index,
            timeout,
            cache: None,
        }
    }

    /// Serve repeated (embedding, fetch_k) lookups from the retrieval cache
    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch a pool of `fetch_k` candidates and return the top `k`
    ///
    /// `candidates` holds at most `k` entries; the full pool stays in
    /// `pool` for the ranker. Both come back in index order (similarity
    /// descending, id ascending).
    pub async fn retrieve(&self, embedding: &[f32], k: usize, fetch_k: usize) -> RetrievalResult {
        let start = Instant::now();

        if fetch_k == 0 {
            return RetrievalResult::ok(self.source, Vec::new(), 0);
        }

        if let Some(cache) = &self.cache {
            if let Some(pool) = cache.get_retrieval(self.source, embedding, fetch_k) {
                tracing::debug!(source = %self.source, hits = pool.len(), "retrieval cache hit");
                return RetrievalResult::ok(self.source, pool, elapsed_ms(start)).limited_to(k);
            }
        }

        let mut pool: Vec<Candidate> = Vec::with_capacity(fetch_k);
        let outcome =
            tokio::time::timeout(self.timeout, self.index.search(embedding, fetch_k, &mut pool))
                .await;
        let elapsed = elapsed_ms(start);

        match outcome {
            Ok(Ok(())) => {
                let pool = self.normalize(pool, fetch_k);
                tracing::debug!(
                    source = %self.source,
                    backend = self.index.name(),
                    hits = pool.len(),
                    k,
                    fetch_k,
                    elapsed_ms = elapsed,
                    "retrieval completed"
                );
                if let Some(cache) = &self.cache {
                    cache.put_retrieval(self.source, embedding, fetch_k, pool.clone());
                }
                RetrievalResult::ok(self.source, pool, elapsed).limited_to(k)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    source = %self.source,
                    backend = self.index.name(),
                    error = %e,
                    "retrieval backend failed"
                );
                RetrievalResult::failed(self.source, e.to_string(), elapsed)
            }
            Err(_) => {
                let partial = self.normalize(pool, fetch_k);
                tracing::warn!(
                    source = %self.source,
                    backend = self.index.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    partial = partial.len(),
                    "retrieval timed out"
                );
                RetrievalResult::timed_out(self.source, partial, elapsed).limited_to(k)
            }
        }
    }

    /// Stamp source, clamp scores, order deterministically and bound the pool
    fn normalize(&self, pool: Vec<Candidate>, fetch_k: usize) -> Vec<Candidate> {
        let mut pool: Vec<Candidate> = pool
            .into_iter()
            .map(|mut c| {
                c.source_kind = self.source;
                c.similarity_score = crate::types::clamp_similarity(c.similarity_score);
                c
            })
            .collect();
        pool.sort_by(Candidate::index_order);
        pool.truncate(fetch_k);
        pool
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{KnowledgeError, Result};
    use async_trait::async_trait;

    struct StaticIndex(Vec<Candidate>);

    #[async_trait]
    impl VectorIndex for StaticIndex {
        async fn search(&self, _e: &[f32], limit: usize, out: &mut Vec<Candidate>) -> Result<()> {
            out.extend(self.0.iter().take(limit).cloned());
            Ok(())
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    /// Emits one hit, then stalls forever
    struct TrickleIndex;

    #[async_trait]
    impl VectorIndex for TrickleIndex {
        async fn search(&self, _e: &[f32], _limit: usize, out: &mut Vec<Candidate>) -> Result<()> {
            out.push(Candidate::new("early", "first hit", SourceKind::Document, 0.6));
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        fn name(&self) -> &str {
            "trickle"
        }
    }

    struct BrokenIndex;

    #[async_trait]
    impl VectorIndex for BrokenIndex {
        async fn search(&self, _e: &[f32], _limit: usize, _out: &mut Vec<Candidate>) -> Result<()> {
            Err(KnowledgeError::RetrievalBackend {
                source_name: "faq".to_string(),
                message: "connection refused".to_string(),
            })
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn retriever(index: impl VectorIndex + 'static, timeout_ms: u64) -> VectorRetriever {
        VectorRetriever::new(
            SourceKind::Document,
            Arc::new(index),
            Duration::from_millis(timeout_ms),
        )
    }

    #[tokio::test]
    async fn test_pool_sorted_with_id_tiebreak() {
        let index = StaticIndex(vec![
            Candidate::new("b", "x", SourceKind::Faq, 0.7),
            Candidate::new("a", "x", SourceKind::Faq, 0.7),
            Candidate::new("c", "x", SourceKind::Faq, 0.9),
        ]);
        let result = retriever(index, 500).retrieve(&[1.0], 2, 8).await;

        assert!(result.succeeded());
        let ids: Vec<_> = result.pool.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        let top: Vec<_> = result.candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(top, vec!["c", "a"]);
        // Source is stamped by the retriever
        assert!(result.pool.iter().all(|c| c.source_kind == SourceKind::Document));
    }

    #[tokio::test]
    async fn test_pool_bounded_by_fetch_k() {
        let hits = (0..10)
            .map(|i| Candidate::new(format!("{:02}", i), "x", SourceKind::Document, 0.5))
            .collect();
        let result = retriever(StaticIndex(hits), 500).retrieve(&[1.0], 2, 4).await;
        assert_eq!(result.pool.len(), 4);
    }

    #[tokio::test]
    async fn test_returned_candidates_bounded_by_k() {
        let hits = (0..10)
            .map(|i| Candidate::new(format!("{:02}", i), "x", SourceKind::Document, 0.9 - i as f32 * 0.05))
            .collect();
        let result = retriever(StaticIndex(hits), 500).retrieve(&[0.6, 0.8], 3, 8).await;

        assert!(result.succeeded());
        assert_eq!(result.candidates.len(), 3);
        assert_eq!(result.pool.len(), 8);
        let ids: Vec<_> = result.candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["00", "01", "02"]);
    }

    #[tokio::test]
    async fn test_cached_pool_still_bounded_by_k() {
        let cache = Arc::new(CacheManager::default());
        let hits: Vec<Candidate> = (0..6)
            .map(|i| Candidate::new(format!("{:02}", i), "x", SourceKind::Document, 0.5))
            .collect();
        let retriever = retriever(StaticIndex(hits), 500).with_cache(cache.clone());

        retriever.retrieve(&[0.2, 0.8], 2, 6).await;
        let cached = retriever.retrieve(&[0.2, 0.8], 2, 6).await;
        assert_eq!(cached.candidates.len(), 2);
        assert_eq!(cached.pool.len(), 6);
    }

    #[tokio::test]
    async fn test_zero_fetch_k_is_empty() {
        let index = StaticIndex(vec![Candidate::new("a", "x", SourceKind::Document, 0.9)]);
        let result = retriever(index, 500).retrieve(&[1.0], 3, 0).await;
        assert!(result.succeeded());
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_pool() {
        let result = retriever(TrickleIndex, 50).retrieve(&[1.0], 3, 8).await;

        assert!(result.timed_out);
        assert!(result.error.is_none());
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].id, "early");
    }

    #[tokio::test]
    async fn test_backend_error_is_recorded() {
        let result = retriever(BrokenIndex, 500).retrieve(&[1.0], 3, 8).await;

        assert!(!result.timed_out);
        assert!(result.is_empty());
        assert!(result.error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_successful_pool_is_cached() {
        let cache = Arc::new(CacheManager::default());
        let index = StaticIndex(vec![Candidate::new("a", "x", SourceKind::Document, 0.9)]);
        let retriever = retriever(index, 500).with_cache(cache.clone());

        retriever.retrieve(&[0.2, 0.8], 3, 8).await;
        assert!(cache.get_retrieval(SourceKind::Document, &[0.2, 0.8], 8).is_some());
    }

    #[tokio::test]
    async fn test_timed_out_pool_not_cached() {
        let cache = Arc::new(CacheManager::default());
        let retriever = retriever(TrickleIndex, 30).with_cache(cache.clone());

        retriever.retrieve(&[0.2, 0.8], 3, 8).await;
        assert!(cache.get_retrieval(SourceKind::Document, &[0.2, 0.8], 8).is_none());
    }
}
