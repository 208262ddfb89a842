//! End-to-end pipeline scenarios with in-process fakes
//!
//! No external services are needed: indexes, embedder, generator and web
//! search are all test doubles from `common`.

mod common;

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::*;
use faqbuddy::cache::CacheManager;
use faqbuddy::rag::context::{ContextBuilder, ContextConfig};
use faqbuddy::rag::{PipelineStage, ProvenanceKind, ResponseMode};
use faqbuddy::{KnowledgeOrchestrator, Query, SourceKind};

#[tokio::test]
async fn test_fees_for_product_scenario() {
    let config = test_config();
    let generator = Arc::new(RecordingGenerator::new(ANSWER));
    let pipeline = pipeline(
        &config,
        Arc::new(ScoredIndex::new("documents", fees_docs())),
        Arc::new(ScoredIndex::new("faq", fees_faq())),
        generator.clone(),
    );

    let response = pipeline
        .answer(Query::new("What are the fees for the maquininha?"))
        .await;

    assert_eq!(response.mode, ResponseMode::Grounded);
    assert!(response.confidence >= 0.7, "confidence {}", response.confidence);
    assert!(!response.flags.any_source_problem());

    // FAQ section precedes DOCUMENTS in the prompt
    let prompt = generator.last_prompt();
    let faq_at = prompt.find("[FAQ]").expect("FAQ section present");
    let docs_at = prompt.find("[DOCUMENTS]").expect("DOCUMENTS section present");
    assert!(faq_at < docs_at);

    assert_eq!(response.sources[0].kind, ProvenanceKind::Faq);
    assert!(response.answer.contains("Sources: https://help.example.com/faq/f1"));
    assert_eq!(
        response.stages,
        vec![
            PipelineStage::Embed,
            PipelineStage::Retrieve,
            PipelineStage::Rank,
            PipelineStage::BuildContext,
            PipelineStage::Score,
            PipelineStage::Generate,
            PipelineStage::Respond,
        ]
    );
}

#[test]
fn test_fees_scenario_budget_split() {
    let config = test_config();
    let builder = ContextBuilder::with_config(ContextConfig::from(&config.pipeline));

    let mut inputs = BTreeMap::new();
    inputs.insert(SourceKind::Faq, fees_faq());
    inputs.insert(SourceKind::Document, fees_docs());

    let sections = builder.build(&inputs, 2000);
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].label, SourceKind::Faq);
    assert_eq!(sections[1].label, SourceKind::Document);

    // 602 FAQ chars against 2404 document chars: proportional share is 400,
    // lifted to the 600 floor; documents take the remainder
    let faq_available = 300 + 2 + 300;
    let docs_available = 3 * 800 + 2 * 2;
    let proportional = 2000 * faq_available / (faq_available + docs_available);
    assert!(sections[0].char_budget >= proportional);
    assert_eq!(sections[0].char_budget, 600);
    assert_eq!(sections[1].char_budget, 2000 - sections[0].char_budget);

    let used: usize = sections.iter().map(|s| s.char_used).sum();
    assert!(used <= 2000);
    for section in &sections {
        assert!(section.char_used <= section.char_budget);
        assert_eq!(section.char_used, section.text.chars().count());
    }
}

#[tokio::test]
async fn test_both_sources_empty_triggers_web_fallback() {
    let config = test_config();
    let generator = Arc::new(RecordingGenerator::new(ANSWER));
    let web = Arc::new(CannedWebSearch::one(
        "https://web.example.com/fees",
        "Card machine fees start at 1.99% per sale.",
    ));
    let pipeline = pipeline(
        &config,
        Arc::new(ScoredIndex::empty("documents")),
        Arc::new(ScoredIndex::empty("faq")),
        generator.clone(),
    )
    .with_web_search(web.clone());

    let response = pipeline.answer(Query::new("What are the fees?")).await;

    assert_eq!(response.confidence, 0.0);
    assert_eq!(response.mode, ResponseMode::WebFallback);
    assert_eq!(web.calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].kind, ProvenanceKind::Web);

    let prompt = generator.last_prompt();
    assert!(prompt.contains("[WEB]"));
    assert!(!prompt.contains("[FAQ]"));
    assert!(!prompt.contains("[DOCUMENTS]"));
}

#[test]
fn test_both_sources_empty_yields_no_sections() {
    let builder = ContextBuilder::new();
    let mut inputs = BTreeMap::new();
    inputs.insert(SourceKind::Faq, Vec::new());
    inputs.insert(SourceKind::Document, Vec::new());
    assert!(builder.build(&inputs, 2000).is_empty());
}

#[tokio::test]
async fn test_empty_context_without_web_says_it_does_not_know() {
    let config = test_config();
    let generator = Arc::new(RecordingGenerator::new(
        "I don't know the answer to that. Please contact human support.",
    ));
    let pipeline = pipeline(
        &config,
        Arc::new(ScoredIndex::empty("documents")),
        Arc::new(ScoredIndex::empty("faq")),
        generator.clone(),
    );

    let response = pipeline.answer(Query::new("What are the fees?")).await;

    assert_eq!(response.mode, ResponseMode::Insufficient);
    assert!(response.flags.out_of_scope);
    assert!(!response.answer.contains("Sources:"));
    assert!(generator.last_prompt().contains("Say that you don't know"));
}

#[tokio::test]
async fn test_faq_timeout_keeps_documents() {
    let config = test_config();
    let generator = Arc::new(RecordingGenerator::new(ANSWER));
    let pipeline = pipeline(
        &config,
        Arc::new(ScoredIndex::new("documents", fees_docs())),
        Arc::new(ScoredIndex::new("faq", fees_faq()).with_delay(Duration::from_secs(2))),
        generator.clone(),
    );

    let started = Instant::now();
    let response = pipeline
        .answer(Query::new("What are the fees for the maquininha?"))
        .await;
    assert!(started.elapsed() < Duration::from_millis(config.pipeline.overall_timeout_ms + 500));

    assert!(response.flags.timed_out.faq);
    assert!(!response.flags.timed_out.documents);
    assert!(!response.flags.overall_timed_out);

    let prompt = generator.last_prompt();
    assert!(prompt.contains("[DOCUMENTS]"));
    assert!(!prompt.contains("[FAQ]"));

    // Documents present plus relevance from the 0.8 top document
    assert!((response.confidence - 0.7).abs() < 1e-6, "confidence {}", response.confidence);
    assert_eq!(response.mode, ResponseMode::Grounded);
    assert!(response.sources.iter().all(|s| s.kind == ProvenanceKind::Document));
}

#[tokio::test]
async fn test_partial_faq_pool_discarded_on_timeout() {
    let config = test_config();
    let generator = Arc::new(RecordingGenerator::new(ANSWER));
    let pipeline = pipeline(
        &config,
        Arc::new(ScoredIndex::new("documents", fees_docs())),
        Arc::new(TrickleIndex::new("faq", faq("early", 0.95, passage("debit", 300)))),
        generator.clone(),
    );

    let response = pipeline
        .answer(Query::new("What are the fees for the maquininha?"))
        .await;

    assert!(response.flags.timed_out.faq);
    assert!(!response.flags.overall_timed_out);

    // The hit that arrived before the timeout stays out of the context
    let prompt = generator.last_prompt();
    assert!(prompt.contains("[DOCUMENTS]"));
    assert!(!prompt.contains("[FAQ]"));
    assert!(response.sources.iter().all(|s| s.kind == ProvenanceKind::Document));

    // Documents weight plus relevance from the 0.8 top document only
    assert!((response.confidence - 0.7).abs() < 1e-6, "confidence {}", response.confidence);
    assert_eq!(response.mode, ResponseMode::Grounded);
}

#[tokio::test]
async fn test_backend_failure_isolated_to_one_source() {
    let config = test_config();
    let generator = Arc::new(RecordingGenerator::new(ANSWER));
    let pipeline = pipeline(
        &config,
        Arc::new(ScoredIndex::new("documents", fees_docs())),
        Arc::new(BrokenIndex),
        generator.clone(),
    );

    let response = pipeline.answer(Query::new("fees?")).await;

    assert!(response
        .flags
        .errors
        .faq
        .as_deref()
        .map_or(false, |e| e.contains("connection refused")));
    assert!(response.flags.errors.documents.is_none());
    assert_eq!(response.mode, ResponseMode::Grounded);
    assert_eq!(pipeline.telemetry().get_stats().faq_errors, 1);
}

#[tokio::test]
async fn test_repeated_query_hits_caches() {
    let config = test_config();
    let embedder = Arc::new(StaticEmbedder::new());
    let docs = Arc::new(ScoredIndex::new("documents", fees_docs()));
    let generator = Arc::new(RecordingGenerator::new(ANSWER));
    let pipeline = KnowledgeOrchestrator::new(
        &config,
        embedder.clone(),
        docs.clone(),
        Arc::new(ScoredIndex::new("faq", fees_faq())),
        generator.clone(),
        CacheManager::shared(config.cache.clone()),
    );

    let first = pipeline.answer(Query::new("Fees for the maquininha?")).await;
    let second = pipeline.answer(Query::new("Fees for the maquininha?")).await;

    assert!(!first.flags.embedding_cache_hit);
    assert!(second.flags.embedding_cache_hit);
    assert!(second.flags.response_cache_hit);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(docs.calls.load(Ordering::SeqCst), 1);
    assert_eq!(generator.prompts().len(), 1);
}

#[tokio::test]
async fn test_disabled_cache_always_recomputes() {
    let mut config = test_config();
    config.cache.enabled = false;
    let embedder = Arc::new(StaticEmbedder::new());
    let pipeline = KnowledgeOrchestrator::new(
        &config,
        embedder.clone(),
        Arc::new(ScoredIndex::new("documents", fees_docs())),
        Arc::new(ScoredIndex::new("faq", fees_faq())),
        Arc::new(RecordingGenerator::new(ANSWER)),
        CacheManager::shared(config.cache.clone()),
    );

    pipeline.answer(Query::new("fees?")).await;
    let second = pipeline.answer(Query::new("fees?")).await;

    assert!(!second.flags.embedding_cache_hit);
    assert!(!second.flags.response_cache_hit);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_portuguese_locale_prompt() {
    let config = test_config();
    let generator = Arc::new(RecordingGenerator::new(ANSWER));
    let pipeline = pipeline(
        &config,
        Arc::new(ScoredIndex::new("documents", fees_docs())),
        Arc::new(ScoredIndex::new("faq", fees_faq())),
        generator.clone(),
    );

    pipeline
        .answer(Query::new("Quais são as taxas da maquininha?").with_locale("pt-BR"))
        .await;

    assert!(generator.last_prompt().starts_with("[pt-BR]"));
}

#[tokio::test]
async fn test_response_serializes_to_json() {
    let config = test_config();
    let pipeline = pipeline(
        &config,
        Arc::new(ScoredIndex::new("documents", fees_docs())),
        Arc::new(ScoredIndex::new("faq", fees_faq())),
        Arc::new(RecordingGenerator::new(ANSWER)),
    );

    let response = pipeline.answer(Query::new("fees?")).await;
    let value: serde_json::Value = serde_json::from_str(&response.to_json().unwrap()).unwrap();

    assert_eq!(value["mode"], "grounded");
    assert_eq!(value["flags"]["timed_out"]["documents"], false);
    assert!(value["timings"]["total_ms"].is_u64());
    assert_eq!(value["strategy"], "parallel");
}
