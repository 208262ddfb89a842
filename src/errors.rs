//! Error types for faqbuddy
//!
//! One error enum for the whole pipeline. Per-source retrieval failures are
//! recorded as data in `RetrievalResult` and never bubble up through a
//! request; the variants below exist so adapters and setup code have a
//! precise vocabulary for what went wrong.

use thiserror::Error;

/// Main error type for the knowledge pipeline
#[derive(Error, Debug)]
pub enum KnowledgeError {
    /// A single retriever exceeded its per-call timeout
    #[error("Retrieval from {source_name} timed out after {timeout_ms}ms")]
    RetrievalTimeout { source_name: String, timeout_ms: u64 },

    /// Vector index backend failure (connection refused, bad response)
    #[error("Retrieval backend error for {source_name}: {message}")]
    RetrievalBackend { source_name: String, message: String },

    /// Cache lock poisoned or otherwise unusable; callers degrade to a miss
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// The overall retrieval stage deadline elapsed
    #[error("Orchestration timed out after {timeout_ms}ms")]
    OrchestrationTimeout { timeout_ms: u64 },

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Generation collaborator errors
    #[error("Generation error: {0}")]
    Generation(String),

    /// Web search collaborator errors
    #[error("Web search error: {0}")]
    WebSearch(String),

    /// Pipeline state machine transition errors
    #[error("Invalid stage transition from {from} via {event}: {reason}")]
    InvalidTransition {
        from: String,
        event: String,
        reason: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("Knowledge pipeline error: {0}")]
    Generic(String),
}

impl KnowledgeError {
    /// Whether retrying the same call could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            KnowledgeError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            KnowledgeError::RetrievalTimeout { .. } | KnowledgeError::RetrievalBackend { .. } => true,
            KnowledgeError::Embedding(msg)
            | KnowledgeError::Generation(msg)
            | KnowledgeError::WebSearch(msg) => {
                msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("Failed to send request")
                    || msg.contains("HTTP 5")
                    || msg.contains("HTTP 429")
            }
            _ => false,
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, KnowledgeError>;

/// Convert anyhow errors to KnowledgeError
impl From<anyhow::Error> for KnowledgeError {
    fn from(err: anyhow::Error) -> Self {
        KnowledgeError::Generic(err.to_string())
    }
}
