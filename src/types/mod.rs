//! Type definitions module
//!
//! Core value types shared by every pipeline stage.

pub mod query;
pub mod candidate;

// Re-export commonly used types
pub use query::{normalize_text, EmbeddingVector, Query, DEFAULT_LOCALE};
pub use candidate::{clamp_similarity, Candidate, RetrievalResult, SourceKind};
