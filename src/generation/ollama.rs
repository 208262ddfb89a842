//! Ollama generation client
//!
//! Endpoint: POST /api/generate with `stream: false` and temperature 0, so
//! equal prompts give equal answers and the response cache stays honest.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ServicesConfig;
use crate::errors::{KnowledgeError, Result};
use crate::generation::Generator;
use crate::retry::RetryManager;

/// Ollama generation client
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    retry: RetryManager,
}

impl OllamaGenerator {
    pub fn from_config(services: &ServicesConfig) -> Result<Self> {
        Self::with_config(
            &services.ollama_url,
            &services.generation_model,
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

    /// Check if Ollama is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/version", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn generate_once(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature: 0.0 },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| KnowledgeError::Generation(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(KnowledgeError::Generation(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| KnowledgeError::Generation(format!("Failed to parse response: {}", e)))?;

        Ok(body.response)
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str, _locale: &str) -> Result<String> {
        self.retry
            .execute_with_retry("ollama_generate", || self.generate_once(prompt))
            .await
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}
