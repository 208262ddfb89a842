//! Retrieval orchestrator
//!
//! Fans one query embedding out to the documents and FAQ retrievers.
//!
//! - Parallel: both retrievals are spawned as tasks and joined against a
//!   single overall deadline; whatever has not finished by then is aborted
//!   and reported as timed out.
//! - Staged (sequential strategy): documents first, FAQ only when the best
//!   document falls below the staged relevance threshold.
//! - Saturated: when the shared worker pool cannot take both retrievals at
//!   once, they run one after the other instead of queueing more tasks.
//!
//! Every path returns within the overall timeout plus scheduling slack.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::PipelineConfig;
use crate::rag::retrieval::VectorRetriever;
use crate::rag::strategy::ExecutionStrategy;
use crate::types::{EmbeddingVector, RetrievalResult, SourceKind};

/// Knobs the orchestrator needs from the pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    pub k: usize,
    pub fetch_k: usize,
    pub overall_timeout_ms: u64,
    pub staged_relevance_threshold: f32,
}

impl RetrievalSettings {
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }
}

impl From<&PipelineConfig> for RetrievalSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            k: config.k,
            fetch_k: config.fetch_k,
            overall_timeout_ms: config.overall_timeout_ms,
            staged_relevance_threshold: config.staged_relevance_threshold,
        }
    }
}

/// Results of one RETRIEVE stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationOutcome {
    pub documents: RetrievalResult,
    pub faq: RetrievalResult,
    /// Strategy actually executed (saturation can turn parallel into sequential)
    pub strategy: ExecutionStrategy,
    pub overall_timed_out: bool,
    pub elapsed_ms: u64,
}

impl OrchestrationOutcome {
    pub fn result(&self, source: SourceKind) -> &RetrievalResult {
        match source {
            SourceKind::Document => &self.documents,
            SourceKind::Faq => &self.faq,
        }
    }
}

/// Runs the two retrievers under a shared, bounded worker pool
pub struct RetrievalOrchestrator {
    documents: Arc<VectorRetriever>,
    faq: Arc<VectorRetriever>,
    pool: Arc<Semaphore>,
    settings: RetrievalSettings,
}

impl RetrievalOrchestrator {
    pub fn new(
        documents: VectorRetriever,
        faq: VectorRetriever,
        max_workers: usize,
        settings: RetrievalSettings,
    ) -> Self {
        Self::with_pool(
            documents,
            faq,
            Arc::new(Semaphore::new(max_workers.max(1))),
            settings,
        )
    }

    /// Share an existing worker pool
    pub fn with_pool(
        documents: VectorRetriever,
        faq: VectorRetriever,
        pool: Arc<Semaphore>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            documents: Arc::new(documents),
            faq: Arc::new(faq),
            pool,
            settings,
        }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Retrieve from both sources under the overall deadline
    pub async fn retrieve(&self, embedding: EmbeddingVector, strategy: ExecutionStrategy) -> OrchestrationOutcome {
        let start = Instant::now();
        let deadline = start + self.settings.overall_timeout();

        let outcome = match strategy {
            ExecutionStrategy::Sequential => self.run_staged(embedding, start, deadline).await,
            ExecutionStrategy::Parallel if self.pool.available_permits() < 2 => {
                tracing::debug!(
                    available = self.pool.available_permits(),
                    "worker pool saturated, retrieving sequentially"
                );
                self.run_sequential(embedding, start, deadline, false).await
            }
            ExecutionStrategy::Parallel => self.run_parallel(embedding, start, deadline).await,
        };

        if outcome.overall_timed_out {
            tracing::warn!(
                timeout_ms = self.settings.overall_timeout_ms,
                documents_done = !outcome.documents.timed_out,
                faq_done = !outcome.faq.timed_out,
                "retrieval stage hit the overall deadline"
            );
        }

        outcome
    }

    async fn run_parallel(&self, embedding: EmbeddingVector, start: Instant, deadline: Instant) -> OrchestrationOutcome {
        // Both tasks are started before either is awaited
        let docs_handle = self.spawn(self.documents.clone(), embedding.clone());
        let faq_handle = self.spawn(self.faq.clone(), embedding);

        let (documents, docs_late) = join_by(docs_handle, SourceKind::Document, start, deadline).await;
        let (faq, faq_late) = join_by(faq_handle, SourceKind::Faq, start, deadline).await;

        OrchestrationOutcome {
            documents,
            faq,
            strategy: ExecutionStrategy::Parallel,
            overall_timed_out: docs_late || faq_late,
            elapsed_ms: elapsed_ms(start),
        }
    }

    /// Documents first; FAQ only when documents look weak
    async fn run_staged(&self, embedding: EmbeddingVector, start: Instant, deadline: Instant) -> OrchestrationOutcome {
        self.run_sequential(embedding, start, deadline, true).await
    }

    async fn run_sequential(
        &self,
        embedding: EmbeddingVector,
        start: Instant,
        deadline: Instant,
        staged: bool,
    ) -> OrchestrationOutcome {
        let (documents, docs_late) =
            self.run_before(&self.documents, &embedding, start, deadline).await;

        let strong_documents = documents.succeeded()
            && documents
                .top_similarity()
                .map_or(false, |top| top >= self.settings.staged_relevance_threshold);

        let (faq, faq_late) = if docs_late {
            (RetrievalResult::timed_out(SourceKind::Faq, Vec::new(), elapsed_ms(start)), true)
        } else if staged && strong_documents {
            tracing::debug!("documents are strong enough, FAQ skipped");
            (RetrievalResult::skipped(SourceKind::Faq), false)
        } else {
            self.run_before(&self.faq, &embedding, start, deadline).await
        };

        OrchestrationOutcome {
            documents,
            faq,
            strategy: ExecutionStrategy::Sequential,
            overall_timed_out: docs_late || faq_late,
            elapsed_ms: elapsed_ms(start),
        }
    }

    /// Run one retrieval inline, bounded by the deadline
    async fn run_before(
        &self,
        retriever: &Arc<VectorRetriever>,
        embedding: &EmbeddingVector,
        start: Instant,
        deadline: Instant,
    ) -> (RetrievalResult, bool) {
        let work = run_with_permit(
            retriever.clone(),
            self.pool.clone(),
            embedding.clone(),
            self.settings.k,
            self.settings.fetch_k,
        );
        match tokio::time::timeout_at(deadline, work).await {
            Ok(result) => (result, false),
            Err(_) => (
                RetrievalResult::timed_out(retriever.source(), Vec::new(), elapsed_ms(start)),
                true,
            ),
        }
    }

    fn spawn(&self, retriever: Arc<VectorRetriever>, embedding: EmbeddingVector) -> JoinHandle<RetrievalResult> {
        tokio::spawn(run_with_permit(
            retriever,
            self.pool.clone(),
            embedding,
            self.settings.k,
            self.settings.fetch_k,
        ))
    }
}

/// Acquire a worker slot, then retrieve; waits in line when the pool is full
async fn run_with_permit(
    retriever: Arc<VectorRetriever>,
    pool: Arc<Semaphore>,
    embedding: EmbeddingVector,
    k: usize,
    fetch_k: usize,
) -> RetrievalResult {
    let _permit = match pool.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return RetrievalResult::failed(retriever.source(), "worker pool closed", 0),
    };
    retriever.retrieve(&embedding, k, fetch_k).await
}

/// Wait for a spawned retrieval until the deadline; abort it on expiry
async fn join_by(
    mut handle: JoinHandle<RetrievalResult>,
    source: SourceKind,
    start: Instant,
    deadline: Instant,
) -> (RetrievalResult, bool) {
    match tokio::time::timeout_at(deadline, &mut handle).await {
        Ok(Ok(result)) => (result, false),
        Ok(Err(e)) => {
            tracing::error!(source = %source, error = %e, "retrieval task failed");
            (
                RetrievalResult::failed(source, format!("retrieval task failed: {}", e), elapsed_ms(start)),
                false,
            )
        }
        Err(_) => {
            handle.abort();
            (RetrievalResult::timed_out(source, Vec::new(), elapsed_ms(start)), true)
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Result;
    use crate::rag::retrieval::VectorIndex;
    use crate::types::Candidate;
    use async_trait::async_trait;

    struct DelayedIndex {
        delay: Duration,
        hits: Vec<Candidate>,
    }

    #[async_trait]
    impl VectorIndex for DelayedIndex {
        async fn search(&self, _e: &[f32], limit: usize, out: &mut Vec<Candidate>) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            out.extend(self.hits.iter().take(limit).cloned());
            Ok(())
        }

        fn name(&self) -> &str {
            "delayed"
        }
    }

    /// One strong hit, then stalls past the retriever timeout
    struct TrickleIndex;

    #[async_trait]
    impl VectorIndex for TrickleIndex {
        async fn search(&self, _e: &[f32], _limit: usize, out: &mut Vec<Candidate>) -> Result<()> {
            out.push(Candidate::new("early", "passage text", SourceKind::Document, 0.95));
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }

        fn name(&self) -> &str {
            "trickle"
        }
    }

    fn retriever(source: SourceKind, delay_ms: u64, score: f32) -> VectorRetriever {
        let index = DelayedIndex {
            delay: Duration::from_millis(delay_ms),
            hits: vec![Candidate::new(format!("{}-1", source), "passage text", source, score)],
        };
        VectorRetriever::new(source, Arc::new(index), Duration::from_secs(5))
    }

    fn settings(overall_ms: u64) -> RetrievalSettings {
        RetrievalSettings {
            k: 3,
            fetch_k: 8,
            overall_timeout_ms: overall_ms,
            staged_relevance_threshold: 0.75,
        }
    }

    fn embedding() -> EmbeddingVector {
        Arc::from(vec![1.0f32, 0.0])
    }

    #[tokio::test]
    async fn test_parallel_runs_concurrently() {
        let orchestrator = RetrievalOrchestrator::new(
            retriever(SourceKind::Document, 150, 0.8),
            retriever(SourceKind::Faq, 150, 0.9),
            4,
            settings(2000),
        );

        let started = std::time::Instant::now();
        let outcome = orchestrator.retrieve(embedding(), ExecutionStrategy::Parallel).await;

        assert_eq!(outcome.strategy, ExecutionStrategy::Parallel);
        assert!(outcome.documents.succeeded() && outcome.faq.succeeded());
        // Sequential would take at least 300ms
        assert!(started.elapsed() < Duration::from_millis(290));
    }

    #[tokio::test]
    async fn test_overall_timeout_marks_unfinished_source() {
        let orchestrator = RetrievalOrchestrator::new(
            retriever(SourceKind::Document, 10, 0.8),
            retriever(SourceKind::Faq, 3000, 0.9),
            4,
            settings(200),
        );

        let started = std::time::Instant::now();
        let outcome = orchestrator.retrieve(embedding(), ExecutionStrategy::Parallel).await;

        assert!(started.elapsed() < Duration::from_millis(200 + 150));
        assert!(outcome.overall_timed_out);
        assert!(outcome.documents.succeeded());
        assert!(outcome.faq.timed_out);
    }

    #[tokio::test]
    async fn test_staged_skips_faq_for_strong_documents() {
        let orchestrator = RetrievalOrchestrator::new(
            retriever(SourceKind::Document, 1, 0.9),
            retriever(SourceKind::Faq, 1, 0.9),
            4,
            settings(2000),
        );

        let outcome = orchestrator.retrieve(embedding(), ExecutionStrategy::Sequential).await;
        assert_eq!(outcome.strategy, ExecutionStrategy::Sequential);
        assert!(outcome.faq.skipped);
        assert!(outcome.faq.is_empty());
    }

    #[tokio::test]
    async fn test_staged_runs_faq_for_weak_documents() {
        let orchestrator = RetrievalOrchestrator::new(
            retriever(SourceKind::Document, 1, 0.4),
            retriever(SourceKind::Faq, 1, 0.9),
            4,
            settings(2000),
        );

        let outcome = orchestrator.retrieve(embedding(), ExecutionStrategy::Sequential).await;
        assert!(!outcome.faq.skipped);
        assert_eq!(outcome.faq.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_saturated_pool_falls_back_to_sequential() {
        let orchestrator = RetrievalOrchestrator::new(
            retriever(SourceKind::Document, 1, 0.9),
            retriever(SourceKind::Faq, 1, 0.9),
            1,
            settings(2000),
        );

        let outcome = orchestrator.retrieve(embedding(), ExecutionStrategy::Parallel).await;
        assert_eq!(outcome.strategy, ExecutionStrategy::Sequential);
        // Saturation is not staging: FAQ still runs
        assert!(!outcome.faq.skipped);
        assert!(outcome.faq.succeeded());
    }

    #[tokio::test]
    async fn test_staged_ignores_partial_documents_on_timeout() {
        let documents =
            VectorRetriever::new(SourceKind::Document, Arc::new(TrickleIndex), Duration::from_millis(50));
        let orchestrator = RetrievalOrchestrator::new(
            documents,
            retriever(SourceKind::Faq, 1, 0.9),
            4,
            settings(2000),
        );

        let outcome = orchestrator.retrieve(embedding(), ExecutionStrategy::Sequential).await;
        assert!(outcome.documents.timed_out);
        assert!(!outcome.faq.skipped);
        assert!(outcome.faq.succeeded());
    }
}
