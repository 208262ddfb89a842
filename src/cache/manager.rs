//! Cache manager grouping the pipeline's cache namespaces
//!
//! Owned by whoever constructs the `KnowledgeOrchestrator` and shared by
//! every request it serves.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::store::{content_key, CacheStats, CacheStore};
use crate::config::CacheConfig;
use crate::types::{Candidate, EmbeddingVector, SourceKind};

/// Per-namespace statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheManagerStats {
    pub embeddings: CacheStats,
    pub responses: CacheStats,
    pub retrievals: CacheStats,
}

/// Embedding, generated-answer and retrieval-pool caches
pub struct CacheManager {
    embeddings: CacheStore<EmbeddingVector>,
    responses: CacheStore<String>,
    retrievals: CacheStore<Vec<Candidate>>,
    config: CacheConfig,
}

impl CacheManager {
    /// Create cache manager from configuration
    pub fn new(config: CacheConfig) -> Self {
        let cap = config.cache_size_cap;
        Self {
            embeddings: CacheStore::new("embeddings", cap),
            responses: CacheStore::new("responses", cap),
            retrievals: CacheStore::new("retrievals", cap),
            config,
        }
    }

    /// Shared handle with default configuration
    pub fn shared(config: CacheConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// A manager that never stores anything
    pub fn disabled() -> Self {
        Self::new(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Cached embedding for already-normalized query text
    pub fn get_embedding(&self, normalized_text: &str) -> Option<EmbeddingVector> {
        if !self.config.enabled {
            return None;
        }
        self.embeddings
            .get(&content_key("emb", normalized_text.as_bytes()))
    }

    pub fn put_embedding(&self, normalized_text: &str, embedding: EmbeddingVector) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.embeddings.put(
            content_key("emb", normalized_text.as_bytes()),
            embedding,
            self.config.embedding_ttl(),
        )
    }

    /// Cached generated answer for a prompt in a locale
    pub fn get_response(&self, prompt: &str, locale: &str) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        self.responses.get(&response_key(prompt, locale))
    }

    pub fn put_response(&self, prompt: &str, locale: &str, answer: String) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.responses.put(
            response_key(prompt, locale),
            answer,
            self.config.response_ttl(),
        )
    }

    /// Cached raw retrieval pool for one source
    pub fn get_retrieval(
        &self,
        source: SourceKind,
        embedding: &[f32],
        fetch_k: usize,
    ) -> Option<Vec<Candidate>> {
        if !self.config.enabled {
            return None;
        }
        self.retrievals
            .get(&retrieval_key(source, embedding, fetch_k))
    }

    pub fn put_retrieval(
        &self,
        source: SourceKind,
        embedding: &[f32],
        fetch_k: usize,
        pool: Vec<Candidate>,
    ) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.retrievals.put(
            retrieval_key(source, embedding, fetch_k),
            pool,
            self.config.retrieval_ttl(),
        )
    }

    /// Drop everything in every namespace
    pub fn clear(&self) {
        self.embeddings.clear();
        self.responses.clear();
        self.retrievals.clear();
        tracing::info!("all caches cleared");
    }

    pub fn stats(&self) -> CacheManagerStats {
        CacheManagerStats {
            embeddings: self.embeddings.stats(),
            responses: self.responses.stats(),
            retrievals: self.retrievals.stats(),
        }
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn response_key(prompt: &str, locale: &str) -> String {
    let mut material = Vec::with_capacity(prompt.len() + locale.len() + 1);
    material.extend_from_slice(locale.to_lowercase().as_bytes());
    material.push(0);
    material.extend_from_slice(prompt.as_bytes());
    content_key("llm", &material)
}

fn retrieval_key(source: SourceKind, embedding: &[f32], fetch_k: usize) -> String {
    let mut material = Vec::with_capacity(embedding.len() * 4 + 16);
    material.extend_from_slice(source.as_str().as_bytes());
    material.extend_from_slice(&(fetch_k as u64).to_le_bytes());
    for value in embedding {
        material.extend_from_slice(&value.to_le_bytes());
    }
    content_key("ret", &material)
}
