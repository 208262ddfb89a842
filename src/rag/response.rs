//! Caller-facing response
//!
//! Every request produces one `KnowledgeResponse`, including degraded and
//! fallback paths, so callers never have to handle a pipeline error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rag::state::PipelineStage;
use crate::rag::strategy::ExecutionStrategy;
use crate::telemetry::StageTimings;
use crate::types::SourceKind;

/// Where a cited URL came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceKind {
    Faq,
    Document,
    Web,
}

impl From<SourceKind> for ProvenanceKind {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Faq => ProvenanceKind::Faq,
            SourceKind::Document => ProvenanceKind::Document,
        }
    }
}

impl ProvenanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvenanceKind::Faq => "faq",
            ProvenanceKind::Document => "document",
            ProvenanceKind::Web => "web",
        }
    }
}

/// One cited source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub url: String,
    pub kind: ProvenanceKind,
}

/// How the answer was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Generated from retrieved catalog context
    Grounded,
    /// Generated from web search results
    WebFallback,
    /// No usable context; the answer says so
    Insufficient,
    /// An internal failure was converted into a canned answer
    Degraded,
}

impl ResponseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMode::Grounded => "grounded",
            ResponseMode::WebFallback => "web_fallback",
            ResponseMode::Insufficient => "insufficient",
            ResponseMode::Degraded => "degraded",
        }
    }
}

/// A value for each retrieval source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerSource<T> {
    pub documents: T,
    pub faq: T,
}

impl<T> PerSource<T> {
    pub fn get(&self, source: SourceKind) -> &T {
        match source {
            SourceKind::Document => &self.documents,
            SourceKind::Faq => &self.faq,
        }
    }

    pub fn set(&mut self, source: SourceKind, value: T) {
        match source {
            SourceKind::Document => self.documents = value,
            SourceKind::Faq => self.faq = value,
        }
    }
}

/// Diagnostics attached to every response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticFlags {
    pub timed_out: PerSource<bool>,
    pub errors: PerSource<Option<String>>,
    pub overall_timed_out: bool,
    pub embedding_cache_hit: bool,
    pub response_cache_hit: bool,
    pub out_of_scope: bool,
    /// Set when the safety net replaced an internal failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_error: Option<String>,
}

impl DiagnosticFlags {
    pub fn any_source_problem(&self) -> bool {
        self.timed_out.documents
            || self.timed_out.faq
            || self.errors.documents.is_some()
            || self.errors.faq.is_some()
    }
}

/// Result of one knowledge request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeResponse {
    pub request_id: Uuid,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub confidence: f32,
    pub mode: ResponseMode,
    pub strategy: ExecutionStrategy,
    pub timings: StageTimings,
    pub flags: DiagnosticFlags,
    pub stages: Vec<PipelineStage>,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeResponse {
    /// Source URLs in citation order
    pub fn source_urls(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.url.as_str()).collect()
    }

    pub fn is_degraded(&self) -> bool {
        self.mode == ResponseMode::Degraded
    }

    pub fn to_json(&self) -> crate::errors::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
