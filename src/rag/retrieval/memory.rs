//! In-process brute-force vector index
//!
//! Cosine similarity over every stored entry. Suitable for tests and small
//! catalogs that fit in memory.

use async_trait::async_trait;
use std::sync::RwLock;

use crate::errors::{KnowledgeError, Result};
use crate::rag::retrieval::index::VectorIndex;
use crate::rag::similarity::cosine_similarity;
use crate::types::Candidate;

/// In-memory vector index
#[derive(Default)]
pub struct InMemoryIndex {
    name: String,
    entries: RwLock<Vec<(Vec<f32>, Candidate)>>,
}

impl InMemoryIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Store a candidate under its embedding
    ///
    /// The stored candidate keeps a copy of the vector so the ranker can
    /// measure diversity against it.
    pub fn insert(&self, embedding: Vec<f32>, candidate: Candidate) -> Result<()> {
        if embedding.is_empty() {
            return Err(KnowledgeError::Generic(format!(
                "empty embedding for entry {}",
                candidate.id
            )));
        }
        let candidate = candidate.with_embedding(embedding.clone());
        let mut entries = self
            .entries
            .write()
            .map_err(|_| KnowledgeError::Generic("in-memory index lock poisoned".to_string()))?;
        entries.retain(|(_, existing)| existing.id != candidate.id);
        entries.push((embedding, candidate));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn search(&self, embedding: &[f32], limit: usize, out: &mut Vec<Candidate>) -> Result<()> {
        let entries = self.entries.read().map_err(|_| KnowledgeError::RetrievalBackend {
            source_name: self.name.clone(),
            message: "index lock poisoned".to_string(),
        })?;

        let mut scored: Vec<Candidate> = entries
            .iter()
            .map(|(vector, candidate)| {
                let mut hit = candidate.clone();
                hit.similarity_score = cosine_similarity(embedding, vector).clamp(0.0, 1.0);
                hit
            })
            .collect();
        drop(entries);

        scored.sort_by(Candidate::index_order);
        out.extend(scored.into_iter().take(limit));
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
