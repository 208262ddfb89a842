//! Retrieval and context assembly pipeline
//!
//! Components:
//! - Retrieval: per-source vector retrievers and the parallel orchestrator
//! - Ranking: product affinity plus MMR diversity
//! - Context: budgeted, labeled sections for the prompt
//! - Confidence: weighted retrieval quality score
//! - Pipeline: end-to-end knowledge orchestration over the stage machine

pub mod similarity;
pub mod retrieval;
pub mod products;
pub mod strategy;
pub mod orchestrator;
pub mod reranking;
pub mod context;
pub mod confidence;
pub mod state;
pub mod response;
pub mod pipeline;

// Re-export key types
pub use confidence::{ConfidenceBreakdown, ConfidenceScorer};
pub use context::{ContextBuilder, ContextConfig, ContextSection};
pub use orchestrator::{OrchestrationOutcome, RetrievalOrchestrator, RetrievalSettings};
pub use pipeline::KnowledgeOrchestrator;
pub use products::{ProductCatalog, ProductFocus};
pub use reranking::{RankConfig, RankedCandidate, Ranker};
pub use response::{DiagnosticFlags, KnowledgeResponse, PerSource, ProvenanceKind, ResponseMode, SourceRef};
pub use retrieval::{InMemoryIndex, QdrantIndex, VectorIndex, VectorRetriever};
pub use state::{PipelineStage, StageEvent, StageTracker};
pub use strategy::{choose_strategy, ExecutionStrategy, StrategyPolicy};
