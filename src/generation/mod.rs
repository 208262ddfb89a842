//! Answer generation
//!
//! - `Generator`: seam to the language model
//! - Ollama client (non-streaming `/api/generate`)
//! - Prompt construction and answer post-processing

pub mod ollama;
pub mod prompt;

use async_trait::async_trait;

use crate::errors::Result;

pub use ollama::OllamaGenerator;
pub use prompt::{attach_sources, build_prompt, is_out_of_scope, RETRY_SUFFIX};

/// Language-model generation function
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce an answer for a prompt that already embeds its context
    async fn generate(&self, prompt: &str, locale: &str) -> Result<String>;

    /// Model name for logs
    fn name(&self) -> &str;
}
