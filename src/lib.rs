//! faqbuddy - retrieval and context assembly for product-catalog QA
//!
//! Answers customer questions from two vector indexes (documentation and
//! FAQ), falling back to web search when retrieval confidence is low.
//!
//! # Architecture
//!
//! - **Retrieval**: per-source retrievers fanned out in parallel under a
//!   bounded worker pool and an overall deadline
//! - **Ranking**: product affinity and MMR diversity
//! - **Context**: budgeted FAQ and DOCUMENTS sections
//! - **Orchestration**: a stage machine that always ends in a response

pub mod errors;
pub mod config;
pub mod types;
pub mod cache;
pub mod retry;
pub mod embedding;
pub mod generation;
pub mod websearch;
pub mod rag;
pub mod telemetry;
pub mod cli;

// Re-export commonly used types
pub use config::Config;
pub use errors::{KnowledgeError, Result};
pub use rag::{KnowledgeOrchestrator, KnowledgeResponse};
pub use types::{Candidate, Query, RetrievalResult, SourceKind};
