//! Tavily web search client
//!
//! Endpoint: POST https://api.tavily.com/search

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ServicesConfig;
use crate::errors::{KnowledgeError, Result};
use crate::retry::RetryManager;
use crate::websearch::{WebResult, WebSearch};

pub const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Tavily search client
#[derive(Debug, Clone)]
pub struct TavilySearch {
    client: Client,
    api_key: String,
    endpoint: String,
    max_results: usize,
    retry: RetryManager,
}

impl TavilySearch {
    /// Build from configuration; `None` when no API key is configured
    pub fn from_config(services: &ServicesConfig) -> Result<Option<Self>> {
        match services.web_search_api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => {
                Self::new(key, services.web_search_results).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn new(api_key: &str, max_results: usize) -> Result<Self> {
        let client = Client::builder().timeout(SEARCH_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            endpoint: TAVILY_SEARCH_URL.to_string(),
            max_results: max_results.max(1),
            retry: RetryManager::with_config(2, 200),
        })
    }

    /// Point at a different endpoint (proxies, test servers)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn search_once(&self, query: &str) -> Result<Vec<WebResult>> {
        let request = SearchRequest {
            api_key: &self.api_key,
            query,
            max_results: self.max_results,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| KnowledgeError::WebSearch(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            return Err(KnowledgeError::WebSearch(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| KnowledgeError::WebSearch(format!("Failed to parse response: {}", e)))?;

        Ok(body.into_results(self.max_results))
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, query: &str) -> Result<Vec<WebResult>> {
        self.retry
            .execute_with_retry("tavily_search", || self.search_once(query))
            .await
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

impl SearchResponse {
    fn into_results(self, limit: usize) -> Vec<WebResult> {
        self.results
            .into_iter()
            .filter_map(|hit| {
                let snippet = hit.content.or(hit.snippet)?;
                Some(WebResult {
                    url: hit.url,
                    snippet,
                })
            })
            .take(limit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_key() {
        let services = ServicesConfig::default();
        assert!(TavilySearch::from_config(&services).unwrap().is_none());

        let services = ServicesConfig {
            web_search_api_key: Some("  ".to_string()),
            ..ServicesConfig::default()
        };
        assert!(TavilySearch::from_config(&services).unwrap().is_none());
    }

    #[test]
    fn test_response_parsing_prefers_content() {
        let body: SearchResponse = serde_json::from_str(
            r#"{"results":[
                {"url":"https://a","content":"from content","snippet":"ignored"},
                {"url":"https://b","snippet":"from snippet"},
                {"url":"https://c"}
            ]}"#,
        )
        .unwrap();

        let results = body.into_results(5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].snippet, "from content");
        assert_eq!(results[1].snippet, "from snippet");
    }

    #[tokio::test]
    #[ignore] // Integration test - requires TAVILY_API_KEY and network
    async fn test_live_search() {
        let key = std::env::var("TAVILY_API_KEY").unwrap();
        let search = TavilySearch::new(&key, 3).unwrap();
        let results = search.search("pix fees").await.unwrap();
        assert!(results.len() <= 3);
    }
}
