//! Knowledge orchestrator
//!
//! Drives one request through the stage machine:
//!
//! EMBED → RETRIEVE → RANK → BUILD_CONTEXT → SCORE → {GENERATE | WEB_FALLBACK} → RESPOND
//!
//! Collaborators (embedder, indexes, generator, web search, caches) are
//! injected at construction. `answer` never fails: per-source problems are
//! recorded in the diagnostics, and anything unexpected, panics included,
//! is converted into a degraded response at RESPOND.

use chrono::Utc;
use futures_util::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::cache::CacheManager;
use crate::config::Config;
use crate::embedding::{CachedEmbedder, Embedder, OllamaEmbedder};
use crate::errors::Result;
use crate::generation::{attach_sources, build_prompt, is_out_of_scope, Generator, OllamaGenerator, RETRY_SUFFIX};
use crate::rag::confidence::{average_top_similarity, ConfidenceScorer};
use crate::rag::context::{ContextBuilder, ContextConfig, ContextSection};
use crate::rag::orchestrator::{OrchestrationOutcome, RetrievalOrchestrator, RetrievalSettings};
use crate::rag::products::{ProductCatalog, ProductFocus};
use crate::rag::reranking::{RankConfig, Ranker};
use crate::rag::response::{DiagnosticFlags, KnowledgeResponse, ProvenanceKind, ResponseMode, SourceRef};
use crate::rag::retrieval::{QdrantIndex, VectorIndex, VectorRetriever};
use crate::rag::state::{PipelineStage, StageEvent, StageTracker};
use crate::rag::strategy::{choose_strategy, ExecutionStrategy, StrategyPolicy};
use crate::telemetry::{PipelineTelemetry, StageTimings, TelemetryEvent};
use crate::types::{Candidate, Query, SourceKind};
use crate::websearch::{render_results, TavilySearch, WebSearch};

/// Settings used outside the retrieval stage
#[derive(Debug, Clone)]
struct AnswerSettings {
    max_context_chars: usize,
    confidence_threshold: f32,
    max_sources: usize,
    min_answer_length: usize,
}

/// Mutable bookkeeping for one request
struct RequestState {
    request_id: Uuid,
    started: Instant,
    tracker: StageTracker,
    timings: StageTimings,
    flags: DiagnosticFlags,
    strategy: ExecutionStrategy,
    confidence: f32,
    answer: String,
    sources: Vec<SourceRef>,
    mode: ResponseMode,
}

impl RequestState {
    fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            started: Instant::now(),
            tracker: StageTracker::new(),
            timings: StageTimings::default(),
            flags: DiagnosticFlags::default(),
            strategy: ExecutionStrategy::Parallel,
            confidence: 0.0,
            answer: String::new(),
            sources: Vec::new(),
            mode: ResponseMode::Insufficient,
        }
    }

    fn advance(&mut self, event: StageEvent) -> Result<PipelineStage> {
        self.tracker.advance(event)
    }

    fn into_response(self) -> KnowledgeResponse {
        let mut timings = self.timings;
        timings.total_ms = elapsed_ms(self.started);

        KnowledgeResponse {
            request_id: self.request_id,
            answer: self.answer,
            sources: self.sources,
            confidence: self.confidence,
            mode: self.mode,
            strategy: self.strategy,
            timings,
            flags: self.flags,
            stages: self.tracker.into_visited(),
            created_at: Utc::now(),
        }
    }
}

/// Top-level pipeline for product questions
pub struct KnowledgeOrchestrator {
    embedder: CachedEmbedder,
    retrieval: RetrievalOrchestrator,
    ranker: Ranker,
    context: ContextBuilder,
    scorer: ConfidenceScorer,
    catalog: ProductCatalog,
    policy: StrategyPolicy,
    generator: Arc<dyn Generator>,
    web_search: Option<Arc<dyn WebSearch>>,
    cache: Arc<CacheManager>,
    telemetry: PipelineTelemetry,
    settings: AnswerSettings,
}

impl KnowledgeOrchestrator {
    /// Assemble the pipeline from injected collaborators
    pub fn new(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        documents: Arc<dyn VectorIndex>,
        faq: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
        cache: Arc<CacheManager>,
    ) -> Self {
        let p = &config.pipeline;
        let timeout = p.retrieval_timeout();

        let documents = VectorRetriever::new(SourceKind::Document, documents, timeout).with_cache(cache.clone());
        let faq = VectorRetriever::new(SourceKind::Faq, faq, timeout).with_cache(cache.clone());

        Self {
            embedder: CachedEmbedder::new(embedder, cache.clone()),
            retrieval: RetrievalOrchestrator::new(documents, faq, p.max_workers, RetrievalSettings::from(p)),
            ranker: Ranker::with_config(RankConfig::from(p)),
            context: ContextBuilder::with_config(ContextConfig::from(p)),
            scorer: ConfidenceScorer::new(config.confidence.clone()),
            catalog: ProductCatalog::default(),
            policy: StrategyPolicy::from(p),
            generator,
            web_search: None,
            cache,
            telemetry: PipelineTelemetry::new(),
            settings: AnswerSettings {
                max_context_chars: p.max_context_chars,
                confidence_threshold: p.confidence_threshold,
                max_sources: p.max_sources,
                min_answer_length: p.min_answer_length,
            },
        }
    }

    /// Wire the real adapters: Ollama, Qdrant and (when keyed) Tavily
    pub fn from_config(config: &Config) -> Result<Self> {
        let services = &config.services;
        let cache = CacheManager::shared(config.cache.clone());

        let embedder = Arc::new(OllamaEmbedder::from_config(services)?);
        let generator = Arc::new(OllamaGenerator::from_config(services)?);
        let documents = Arc::new(QdrantIndex::connect(
            &services.qdrant_url,
            &services.documents_collection,
            SourceKind::Document,
        )?);
        let faq = Arc::new(QdrantIndex::connect(
            &services.qdrant_url,
            &services.faq_collection,
            SourceKind::Faq,
        )?);

        let mut orchestrator = Self::new(config, embedder, documents, faq, generator, cache);
        if let Some(tavily) = TavilySearch::from_config(services)? {
            orchestrator = orchestrator.with_web_search(Arc::new(tavily));
        }
        Ok(orchestrator)
    }

    pub fn with_web_search(mut self, web_search: Arc<dyn WebSearch>) -> Self {
        self.web_search = Some(web_search);
        self
    }

    pub fn with_catalog(mut self, catalog: ProductCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Share a telemetry collector across orchestrators
    pub fn with_telemetry(mut self, telemetry: PipelineTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn telemetry(&self) -> &PipelineTelemetry {
        &self.telemetry
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn web_search_enabled(&self) -> bool {
        self.web_search.is_some()
    }

    /// Answer one query; always returns a response
    pub async fn answer(&self, query: Query) -> KnowledgeResponse {
        let mut state = RequestState::new();
        tracing::info!(
            request_id = %state.request_id,
            locale = query.locale(),
            product_hint = query.product_hint().unwrap_or(""),
            "knowledge request started"
        );

        let outcome = AssertUnwindSafe(self.run(&query, &mut state))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(panic_message(panic.as_ref())),
        };
        if let Some(reason) = failure {
            self.degrade(&mut state, &query, reason);
        }

        let response = state.into_response();
        self.telemetry.record(TelemetryEvent::RequestCompleted {
            total_ms: response.timings.total_ms,
            confidence: response.confidence,
            timestamp: Instant::now(),
        });
        tracing::info!(
            request_id = %response.request_id,
            mode = response.mode.as_str(),
            confidence = response.confidence,
            total_ms = response.timings.total_ms,
            "knowledge request finished"
        );
        response
    }

    async fn run(&self, query: &Query, state: &mut RequestState) -> Result<()> {
        // EMBED
        let stage_start = Instant::now();
        let embedding = if query.is_blank() {
            record_error_on_all(&mut state.flags, "empty query");
            None
        } else {
            match self.embedder.embed(query.text()).await {
                Ok(outcome) => {
                    state.flags.embedding_cache_hit = outcome.cache_hit;
                    self.telemetry.record(TelemetryEvent::CacheLookup {
                        hit: outcome.cache_hit,
                        timestamp: Instant::now(),
                    });
                    Some(outcome.vector)
                }
                Err(e) => {
                    tracing::warn!(request_id = %state.request_id, error = %e, "embedding failed, continuing without retrieval");
                    record_error_on_all(&mut state.flags, &format!("embedding failed: {}", e));
                    None
                }
            }
        };
        state.timings.embed_ms = elapsed_ms(stage_start);
        state.advance(StageEvent::Complete)?;

        // RETRIEVE
        let stage_start = Instant::now();
        let focus = self.catalog.detect(query);
        state.strategy = choose_strategy(query, &focus, &self.policy);
        let retrieved = match embedding {
            Some(vector) => {
                let outcome = self.retrieval.retrieve(vector, state.strategy).await;
                state.strategy = outcome.strategy;
                self.record_outcome(&outcome, state);
                Some(outcome)
            }
            None => None,
        };
        state.timings.retrieve_ms = elapsed_ms(stage_start);
        state.advance(StageEvent::Complete)?;

        // RANK
        let stage_start = Instant::now();
        let ranked = self.rank(retrieved.as_ref(), &focus);
        state.timings.rank_ms = elapsed_ms(stage_start);
        state.advance(StageEvent::Complete)?;

        // BUILD_CONTEXT
        let stage_start = Instant::now();
        let sections = self.context.build(&ranked, self.settings.max_context_chars);
        let context_text = ContextBuilder::render(&sections);
        let catalog_sources = collect_sources(&sections);
        state.timings.build_context_ms = elapsed_ms(stage_start);
        state.advance(StageEvent::Complete)?;

        // SCORE
        let stage_start = Instant::now();
        let has_docs = ranked.get(&SourceKind::Document).map_or(false, |c| !c.is_empty());
        let has_faq = ranked.get(&SourceKind::Faq).map_or(false, |c| !c.is_empty());
        let average = average_top_similarity(SourceKind::ALL.iter().map(|kind| {
            ranked
                .get(kind)
                .and_then(|c| c.iter().map(|c| c.similarity_score).reduce(f32::max))
        }));
        let breakdown = self.scorer.breakdown(has_docs, has_faq, average);
        state.confidence = breakdown.score;
        state.timings.score_ms = elapsed_ms(stage_start);
        tracing::debug!(
            request_id = %state.request_id,
            documents = breakdown.documents,
            faq = breakdown.faq,
            relevance = breakdown.relevance,
            average_top_similarity = breakdown.average_top_similarity,
            score = breakdown.score,
            "confidence scored"
        );

        let low_confidence = breakdown.score < self.settings.confidence_threshold;
        let web_search = match (&self.web_search, low_confidence) {
            (Some(web), true) => Some(web.clone()),
            _ => None,
        };

        if let Some(web) = web_search {
            state.advance(StageEvent::LowConfidence)?;
            if self.web_fallback(web.as_ref(), query, state).await? {
                state.advance(StageEvent::Complete)?;
                return self.respond(state);
            }
            state.advance(StageEvent::NoResults)?;
        } else {
            state.advance(StageEvent::Complete)?;
        }

        // GENERATE
        let stage_start = Instant::now();
        let prompt = build_prompt(query, &context_text);
        match self.generate_answer(&prompt, query.locale(), &mut state.flags).await {
            Ok(answer) => {
                state.answer = answer;
                state.sources = catalog_sources;
                state.mode = if context_text.is_empty() {
                    ResponseMode::Insufficient
                } else {
                    ResponseMode::Grounded
                };
            }
            Err(e) => {
                tracing::error!(request_id = %state.request_id, error = %e, "generation failed");
                state.sources = catalog_sources;
                self.mark_degraded(state, query, format!("generation failed: {}", e));
            }
        }
        state.timings.generate_ms = elapsed_ms(stage_start);
        state.advance(StageEvent::Complete)?;

        self.respond(state)
    }

    /// Search the web and answer from its results; false when nothing usable came back
    async fn web_fallback(&self, web: &dyn WebSearch, query: &Query, state: &mut RequestState) -> Result<bool> {
        let stage_start = Instant::now();
        let results = match web.search(query.text()).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(request_id = %state.request_id, provider = web.name(), error = %e, "web search failed");
                Vec::new()
            }
        };
        let (web_context, urls) = render_results(&results, self.settings.max_context_chars);
        state.timings.web_fallback_ms = elapsed_ms(stage_start);
        self.telemetry.record(TelemetryEvent::WebFallback {
            results: results.len(),
            timestamp: Instant::now(),
        });

        if web_context.is_empty() {
            tracing::info!(request_id = %state.request_id, "web fallback returned nothing usable");
            return Ok(false);
        }

        let stage_start = Instant::now();
        let prompt = build_prompt(query, &web_context);
        state.sources = urls
            .into_iter()
            .map(|url| SourceRef {
                url,
                kind: ProvenanceKind::Web,
            })
            .collect();
        match self.generate_answer(&prompt, query.locale(), &mut state.flags).await {
            Ok(answer) => {
                state.answer = answer;
                state.mode = ResponseMode::WebFallback;
            }
            Err(e) => {
                tracing::error!(request_id = %state.request_id, error = %e, "generation from web results failed");
                self.mark_degraded(state, query, format!("generation failed: {}", e));
            }
        }
        state.timings.generate_ms = elapsed_ms(stage_start);
        Ok(true)
    }

    /// RESPOND: scope check and source attachment
    fn respond(&self, state: &mut RequestState) -> Result<()> {
        if state.mode == ResponseMode::Degraded {
            return Ok(());
        }

        state.flags.out_of_scope = is_out_of_scope(&state.answer);
        let urls: Vec<String> = state.sources.iter().map(|s| s.url.clone()).collect();
        state.answer = attach_sources(&state.answer, &urls, self.settings.max_sources);
        Ok(())
    }

    /// Generate with the response cache and one retry for short answers
    async fn generate_answer(&self, prompt: &str, locale: &str, flags: &mut DiagnosticFlags) -> Result<String> {
        if let Some(cached) = self.cache.get_response(prompt, locale) {
            flags.response_cache_hit = true;
            return Ok(cached);
        }

        let min_len = self.settings.min_answer_length;
        let mut answer = self.generator.generate(prompt, locale).await?.trim().to_string();

        if answer.chars().count() < min_len {
            tracing::debug!(length = answer.chars().count(), "short answer, retrying once");
            let retry_prompt = format!("{}{}", prompt, RETRY_SUFFIX);
            match self.generator.generate(&retry_prompt, locale).await {
                Ok(second) => {
                    let second = second.trim().to_string();
                    if second.chars().count() > answer.chars().count() {
                        answer = second;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "short-answer retry failed, keeping first answer"),
            }
        }

        if answer.chars().count() >= min_len {
            self.cache.put_response(prompt, locale, answer.clone());
        }
        Ok(answer)
    }

    fn record_outcome(&self, outcome: &OrchestrationOutcome, state: &mut RequestState) {
        state.flags.overall_timed_out = outcome.overall_timed_out;
        if outcome.overall_timed_out {
            self.telemetry.record(TelemetryEvent::OverallTimeout {
                timestamp: Instant::now(),
            });
        }

        for source in SourceKind::ALL {
            let result = outcome.result(source);
            state.flags.timed_out.set(source, result.timed_out);
            state.flags.errors.set(source, result.error.clone());

            if result.timed_out {
                self.telemetry.record(TelemetryEvent::SourceTimedOut {
                    source,
                    timestamp: Instant::now(),
                });
            }
            if result.error.is_some() {
                self.telemetry.record(TelemetryEvent::SourceFailed {
                    source,
                    timestamp: Instant::now(),
                });
            }
        }
    }

    /// Rank each source's pool; timed-out or failed sources count as empty
    fn rank(&self, outcome: Option<&OrchestrationOutcome>, focus: &ProductFocus) -> BTreeMap<SourceKind, Vec<Candidate>> {
        SourceKind::ALL
            .iter()
            .map(|&source| {
                let ranked: Vec<Candidate> = match outcome {
                    Some(outcome) => self
                        .ranker
                        .rank(outcome.result(source).usable_pool().to_vec(), focus)
                        .into_iter()
                        .map(|r| r.candidate)
                        .collect(),
                    None => Vec::new(),
                };
                (source, ranked)
            })
            .collect()
    }

    fn mark_degraded(&self, state: &mut RequestState, query: &Query, reason: String) {
        self.telemetry.record(TelemetryEvent::Degraded {
            reason: reason.clone(),
            timestamp: Instant::now(),
        });
        state.answer = degraded_answer(query).to_string();
        state.mode = ResponseMode::Degraded;
        state.flags.internal_error = Some(reason);
    }

    /// Safety net: the request failed somewhere unexpected
    fn degrade(&self, state: &mut RequestState, query: &Query, reason: String) {
        tracing::error!(
            request_id = %state.request_id,
            stage = state.tracker.current().display_name(),
            reason = %reason,
            "request degraded"
        );
        self.mark_degraded(state, query, reason);
        // Abort is valid from every stage
        let _ = state.advance(StageEvent::Abort);
    }
}

fn record_error_on_all(flags: &mut DiagnosticFlags, message: &str) {
    for source in SourceKind::ALL {
        flags.errors.set(source, Some(message.to_string()));
    }
}

/// Deduplicated source URLs in context order
fn collect_sources(sections: &[ContextSection]) -> Vec<SourceRef> {
    let mut sources: Vec<SourceRef> = Vec::new();
    for section in sections.iter().filter(|s| !s.is_empty()) {
        for url in &section.source_urls {
            if url.is_empty() || sources.iter().any(|s| &s.url == url) {
                continue;
            }
            sources.push(SourceRef {
                url: url.clone(),
                kind: section.label.into(),
            });
        }
    }
    sources
}

fn degraded_answer(query: &Query) -> &'static str {
    if query.is_portuguese() {
        "Desculpe, não foi possível gerar uma resposta agora. Tente novamente em instantes ou fale com o suporte humano."
    } else {
        "Sorry, an answer could not be generated right now. Please try again shortly or contact human support."
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("internal panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("internal panic: {}", s)
    } else {
        "internal panic".to_string()
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
