//! Configuration management for faqbuddy
//!
//! Provides TOML-based configuration with defaults, validation and a small
//! set of environment overrides.
//! Location: ~/.faqbuddy/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{KnowledgeError, Result};

/// Complete configuration for faqbuddy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the orchestrator picks between parallel and staged retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    /// Both sources always run concurrently
    AlwaysParallel,
    /// Complex queries may run documents first and skip FAQ
    Adaptive,
}

/// Retrieval, ranking and context budget settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_context_chars: usize,
    pub retrieval_timeout_ms: u64,
    pub overall_timeout_ms: u64,
    pub mmr_lambda: f32,
    pub k: usize,
    pub fetch_k: usize,
    pub confidence_threshold: f32,
    /// Worker pool size shared by all in-flight retrievals
    pub max_workers: usize,
    pub strategy_mode: StrategyMode,
    /// Complexity score at or above which a query counts as complex
    pub complexity_threshold: usize,
    /// Staged path: FAQ runs only if the best document scores below this
    pub staged_relevance_threshold: f32,
    /// Minimum characters for any non-empty source when several compete
    pub min_section_chars: usize,
    /// Largest share of the budget one source may take
    pub max_section_share: f32,
    /// Cap on a source's counted content when computing proportions
    pub max_available_chars_per_source: usize,
    pub product_affinity_bonus: f32,
    /// Maximum source URLs attached to an answer
    pub max_sources: usize,
    /// Answers shorter than this are retried once and not cached
    pub min_answer_length: usize,
}

/// Cache capacities and lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Embedding TTL in seconds
    pub cache_ttl_s: u64,
    /// Byte cap for each cache store
    pub cache_size_cap: usize,
    pub response_ttl_s: u64,
    pub retrieval_ttl_s: u64,
    pub enabled: bool,
}

/// Confidence scorer weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub documents_weight: f32,
    pub faq_weight: f32,
    pub relevance_weight: f32,
    /// Average top similarity needed for the relevance signal
    pub relevance_threshold: f32,
}

/// External collaborator endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub ollama_url: String,
    pub embedding_model: String,
    pub generation_model: String,
    pub qdrant_url: String,
    pub documents_collection: String,
    pub faq_collection: String,
    /// Web search is disabled when no key is configured
    pub web_search_api_key: Option<String>,
    pub web_search_results: usize,
    pub request_timeout_sec: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub default_verbosity: String,
    pub color_output: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 3000,
            retrieval_timeout_ms: 1500,
            overall_timeout_ms: 2500,
            mmr_lambda: 0.5,
            k: 3,
            fetch_k: 8,
            confidence_threshold: 0.45,
            max_workers: num_cpus::get().clamp(2, 4),
            strategy_mode: StrategyMode::AlwaysParallel,
            complexity_threshold: 10,
            staged_relevance_threshold: 0.75,
            min_section_chars: 600,
            max_section_share: 0.7,
            max_available_chars_per_source: 6000,
            product_affinity_bonus: 0.1,
            max_sources: 2,
            min_answer_length: 40,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_ttl_s: 3600,
            cache_size_cap: 16 * 1024 * 1024,
            response_ttl_s: 300,
            retrieval_ttl_s: 300,
            enabled: true,
        }
    }
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            documents_weight: 0.4,
            faq_weight: 0.3,
            relevance_weight: 0.3,
            relevance_threshold: 0.7,
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://127.0.0.1:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            generation_model: "qwen2.5:7b-instruct".to_string(),
            qdrant_url: "http://localhost:6334".to_string(),
            documents_collection: "documents".to_string(),
            faq_collection: "faq".to_string(),
            web_search_api_key: None,
            web_search_results: 3,
            request_timeout_sec: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_verbosity: "normal".to_string(),
            color_output: true,
        }
    }
}

impl PipelineConfig {
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }
}

impl CacheConfig {
    pub fn embedding_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_s)
    }

    pub fn response_ttl(&self) -> Duration {
        Duration::from_secs(self.response_ttl_s)
    }

    pub fn retrieval_ttl(&self) -> Duration {
        Duration::from_secs(self.retrieval_ttl_s)
    }
}

impl Config {
    /// Load configuration from file or use defaults, then apply env overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(config_path) = path {
            Self::load_from_file(&config_path)?
        } else {
            Self::load_default()?
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| KnowledgeError::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| KnowledgeError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// Standard config location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".faqbuddy").join("config.toml"))
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("FAQBUDDY_OLLAMA_URL") {
            self.services.ollama_url = url;
        }
        if let Some(url) = lookup("FAQBUDDY_QDRANT_URL") {
            self.services.qdrant_url = url;
        }
        if let Some(key) = lookup("TAVILY_API_KEY") {
            if !key.trim().is_empty() {
                self.services.web_search_api_key = Some(key);
            }
        }
        if let Some(raw) = lookup("FAQBUDDY_CONFIDENCE_THRESHOLD") {
            self.pipeline.confidence_threshold = raw.trim().parse().map_err(|_| {
                KnowledgeError::Config(format!("Invalid FAQBUDDY_CONFIDENCE_THRESHOLD: {}", raw))
            })?;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;

        if p.max_context_chars == 0 {
            return Err(KnowledgeError::Config(
                "max_context_chars must be greater than 0".to_string(),
            ));
        }

        if p.k == 0 {
            return Err(KnowledgeError::Config("k must be greater than 0".to_string()));
        }

        if p.fetch_k < p.k {
            return Err(KnowledgeError::Config(format!(
                "fetch_k ({}) must be at least k ({})",
                p.fetch_k, p.k
            )));
        }

        if p.retrieval_timeout_ms == 0 || p.overall_timeout_ms == 0 {
            return Err(KnowledgeError::Config(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        if p.max_workers == 0 {
            return Err(KnowledgeError::Config(
                "max_workers must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("mmr_lambda", p.mmr_lambda),
            ("confidence_threshold", p.confidence_threshold),
            ("staged_relevance_threshold", p.staged_relevance_threshold),
            ("relevance_threshold", self.confidence.relevance_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(KnowledgeError::Config(format!(
                    "{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        if !(p.max_section_share > 0.0 && p.max_section_share <= 1.0) {
            return Err(KnowledgeError::Config(
                "max_section_share must be in (0.0, 1.0]".to_string(),
            ));
        }

        if p.product_affinity_bonus < 0.0 {
            return Err(KnowledgeError::Config(
                "product_affinity_bonus must not be negative".to_string(),
            ));
        }

        let c = &self.confidence;
        let weights = [c.documents_weight, c.faq_weight, c.relevance_weight];
        if weights.iter().any(|w| *w < 0.0) {
            return Err(KnowledgeError::Config(
                "confidence weights must not be negative".to_string(),
            ));
        }
        let sum: f32 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-3 {
            return Err(KnowledgeError::Config(format!(
                "confidence weights must sum to 1.0 (got {:.3})",
                sum
            )));
        }

        if self.cache.cache_size_cap == 0 {
            return Err(KnowledgeError::Config(
                "cache_size_cap must be greater than 0".to_string(),
            ));
        }

        match self.logging.default_verbosity.as_str() {
            "quiet" | "normal" | "verbose" | "very_verbose" => {}
            _ => {
                return Err(KnowledgeError::Config(format!(
                    "Invalid verbosity level: {}",
                    self.logging.default_verbosity
                )))
            }
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| KnowledgeError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                KnowledgeError::Config(format!("Failed to create config dir: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| KnowledgeError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Whether web search fallback can be used
    pub fn web_search_enabled(&self) -> bool {
        self.services
            .web_search_api_key
            .as_deref()
            .map_or(false, |k| !k.trim().is_empty())
    }
}
