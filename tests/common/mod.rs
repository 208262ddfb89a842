//! Test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use faqbuddy::cache::CacheManager;
use faqbuddy::embedding::Embedder;
use faqbuddy::generation::Generator;
use faqbuddy::rag::retrieval::VectorIndex;
use faqbuddy::websearch::{WebResult, WebSearch};
use faqbuddy::{Candidate, Config, KnowledgeError, KnowledgeOrchestrator, Result, SourceKind};

pub const ANSWER: &str = "The fee is 1.99% per transaction, settled on the next business day.";

/// Always returns the same vector
pub struct StaticEmbedder {
    pub calls: AtomicUsize,
}

impl StaticEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for StaticEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.6, 0.8])
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Returns preset candidates with preset scores, optionally after a delay
pub struct ScoredIndex {
    name: String,
    candidates: Vec<Candidate>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl ScoredIndex {
    pub fn new(name: &str, candidates: Vec<Candidate>) -> Self {
        Self {
            name: name.to_string(),
            candidates,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty(name: &str) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl VectorIndex for ScoredIndex {
    async fn search(&self, _embedding: &[f32], limit: usize, out: &mut Vec<Candidate>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut hits = self.candidates.clone();
        hits.sort_by(Candidate::index_order);
        out.extend(hits.into_iter().take(limit));
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Emits one hit, then stalls well past any retriever timeout
pub struct TrickleIndex {
    name: String,
    first: Candidate,
}

impl TrickleIndex {
    pub fn new(name: &str, first: Candidate) -> Self {
        Self {
            name: name.to_string(),
            first,
        }
    }
}

#[async_trait]
impl VectorIndex for TrickleIndex {
    async fn search(&self, _embedding: &[f32], _limit: usize, out: &mut Vec<Candidate>) -> Result<()> {
        out.push(self.first.clone());
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Backend that always refuses the connection
pub struct BrokenIndex;

#[async_trait]
impl VectorIndex for BrokenIndex {
    async fn search(&self, _embedding: &[f32], _limit: usize, _out: &mut Vec<Candidate>) -> Result<()> {
        Err(KnowledgeError::RetrievalBackend {
            source_name: "broken".to_string(),
            message: "connection refused".to_string(),
        })
    }

    fn name(&self) -> &str {
        "broken"
    }
}

/// Records every prompt and answers with a fixed text
pub struct RecordingGenerator {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, prompt: &str, _locale: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Web search with canned results
pub struct CannedWebSearch {
    results: Vec<WebResult>,
    pub calls: AtomicUsize,
}

impl CannedWebSearch {
    pub fn new(results: Vec<WebResult>) -> Self {
        Self {
            results,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn one(url: &str, snippet: &str) -> Self {
        Self::new(vec![WebResult {
            url: url.to_string(),
            snippet: snippet.to_string(),
        }])
    }
}

#[async_trait]
impl WebSearch for CannedWebSearch {
    async fn search(&self, _query: &str) -> Result<Vec<WebResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.clone())
    }

    fn name(&self) -> &str {
        "canned"
    }
}

/// Text of roughly `chars` characters made of short sentences
pub fn passage(topic: &str, chars: usize) -> String {
    let sentence = format!("The {} fee applies to every sale made with the product. ", topic);
    let mut text = sentence.repeat(chars / sentence.len() + 1);
    // Exact length with no trailing whitespace for trimming to eat
    text.truncate(chars - 1);
    text.push('.');
    text
}

pub fn faq(id: &str, score: f32, text: String) -> Candidate {
    Candidate::new(id, text, SourceKind::Faq, score)
        .with_url(format!("https://help.example.com/faq/{}", id))
        .with_tags(["maquininha"])
}

pub fn doc(id: &str, score: f32, text: String) -> Candidate {
    Candidate::new(id, text, SourceKind::Document, score)
        .with_url(format!("https://docs.example.com/{}", id))
        .with_tags(["maquininha"])
}

/// FAQ 0.9/0.85 and documents 0.8/0.6/0.4
pub fn fees_faq() -> Vec<Candidate> {
    vec![
        faq("f1", 0.9, passage("debit", 300)),
        faq("f2", 0.85, passage("credit", 300)),
    ]
}

pub fn fees_docs() -> Vec<Candidate> {
    vec![
        doc("d1", 0.8, passage("installment", 800)),
        doc("d2", 0.6, passage("anticipation", 800)),
        doc("d3", 0.4, passage("chargeback", 800)),
    ]
}

/// Short timeouts so tests stay fast
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.pipeline.max_context_chars = 2000;
    config.pipeline.retrieval_timeout_ms = 150;
    config.pipeline.overall_timeout_ms = 400;
    config.pipeline.max_workers = 4;
    config
}

pub fn pipeline(
    config: &Config,
    documents: Arc<dyn VectorIndex>,
    faq: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
) -> KnowledgeOrchestrator {
    KnowledgeOrchestrator::new(
        config,
        Arc::new(StaticEmbedder::new()),
        documents,
        faq,
        generator,
        CacheManager::shared(config.cache.clone()),
    )
}
