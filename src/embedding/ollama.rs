//! Ollama embedding client
//!
//! Endpoint: POST /api/embeddings

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ServicesConfig;
use crate::embedding::Embedder;
use crate::errors::{KnowledgeError, Result};
use crate::retry::RetryManager;

/// Embedding client backed by a local Ollama server
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    retry: RetryManager,
}

impl OllamaEmbedder {
    /// Create client from service configuration
    pub fn from_config(services: &ServicesConfig) -> Result<Self> {
        Self::with_config(
            &services.ollama_url,
            &services.embedding_model,
            Duration::from_secs(services.request_timeout_sec),
        )
    }

    pub fn with_config(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            retry: RetryManager::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| KnowledgeError::Embedding(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(KnowledgeError::Embedding(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| KnowledgeError::Embedding(format!("Failed to parse response: {}", e)))?;

        Ok(body.embedding)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.retry
            .execute_with_retry("ollama_embed", || self.embed_once(text))
            .await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}
