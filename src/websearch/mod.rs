//! Web search fallback
//!
//! Invoked only when retrieval confidence falls below the threshold.

pub mod tavily;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

pub use tavily::TavilySearch;

/// One web result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub url: String,
    pub snippet: String,
}

/// External web search
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<WebResult>>;

    fn name(&self) -> &str;
}

/// Render results as a labeled context block within `max_chars`
pub fn render_results(results: &[WebResult], max_chars: usize) -> (String, Vec<String>) {
    let mut text = String::new();
    let mut urls = Vec::new();

    for result in results {
        let snippet = result.snippet.trim();
        if snippet.is_empty() {
            continue;
        }
        let entry = format!("- {} ({})", snippet, result.url);
        let needed = if text.is_empty() { 0 } else { 1 } + entry.chars().count();
        if text.chars().count() + needed > max_chars {
            break;
        }
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&entry);
        if !result.url.is_empty() && !urls.contains(&result.url) {
            urls.push(result.url.clone());
        }
    }

    if text.is_empty() {
        (text, urls)
    } else {
        (format!("[WEB]\n{}", text), urls)
    }
}
