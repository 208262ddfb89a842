//! Query embedding
//!
//! The `Embedder` trait is the seam to the embedding provider.
//! `CachedEmbedder` wraps any provider with the shared embedding cache,
//! keyed by a hash of the normalized query text.

pub mod ollama;

use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::CacheManager;
use crate::errors::{KnowledgeError, Result};
use crate::types::{normalize_text, EmbeddingVector};

pub use ollama::OllamaEmbedder;

/// Embedding provider
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text into a fixed-dimension vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

/// Outcome of an embedding lookup
#[derive(Debug, Clone)]
pub struct EmbeddingOutcome {
    pub vector: EmbeddingVector,
    pub cache_hit: bool,
}

/// Embedder fronted by the shared embedding cache
#[derive(Clone)]
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Arc<CacheManager>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, cache: Arc<CacheManager>) -> Self {
        Self { inner, cache }
    }

    /// Embed text as given; the cache is keyed by its normalized form
    pub async fn embed(&self, text: &str) -> Result<EmbeddingOutcome> {
        let normalized = normalize_text(text);

        if let Some(vector) = self.cache.get_embedding(&normalized) {
            tracing::debug!(provider = self.inner.name(), "embedding cache hit");
            return Ok(EmbeddingOutcome {
                vector,
                cache_hit: true,
            });
        }

        let raw = self.inner.embed(text).await?;
        if raw.is_empty() {
            return Err(KnowledgeError::Embedding(format!(
                "{} returned an empty embedding",
                self.inner.name()
            )));
        }
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(KnowledgeError::Embedding(format!(
                "{} returned a non-finite embedding",
                self.inner.name()
            )));
        }

        let vector: EmbeddingVector = Arc::from(raw);
        self.cache.put_embedding(&normalized, vector.clone());

        Ok(EmbeddingOutcome {
            vector,
            cache_hit: false,
        })
    }
}
