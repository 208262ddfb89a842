//! Retrieved candidates and per-source retrieval results

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Which logical index a candidate came from
///
/// Ordering is the fixed context order: FAQ before documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Faq,
    Document,
}

impl SourceKind {
    /// All sources in context order
    pub const ALL: [SourceKind; 2] = [SourceKind::Faq, SourceKind::Document];

    /// Section label used in the assembled prompt
    pub fn label(&self) -> &'static str {
        match self {
            Self::Faq => "FAQ",
            Self::Document => "DOCUMENTS",
        }
    }

    /// Short machine name used in logs and cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Faq => "faq",
            Self::Document => "documents",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retrieved passage or FAQ entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub text: String,
    pub source_url: String,
    pub product_tags: Vec<String>,
    /// Similarity to the query in [0, 1]
    pub similarity_score: f32,
    pub source_kind: SourceKind,
    /// Stored vector, when the backend returns it; used for diversity scoring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Candidate {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        source_kind: SourceKind,
        similarity_score: f32,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source_url: String::new(),
            product_tags: Vec::new(),
            similarity_score: clamp_similarity(similarity_score),
            source_kind,
            embedding: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = url.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.product_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Index order: similarity descending, then id ascending
    pub fn index_order(a: &Candidate, b: &Candidate) -> Ordering {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Clamp a raw backend score into [0, 1]; NaN becomes 0
pub fn clamp_similarity(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Outcome of one retriever call for one source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub source: SourceKind,
    /// Top `k` of the pool
    pub candidates: Vec<Candidate>,
    /// Over-fetched pool (up to `fetch_k`) the ranker selects from
    #[serde(skip)]
    pub pool: Vec<Candidate>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
    pub timed_out: bool,
    /// Not queried at all (staged execution skipped it)
    #[serde(default)]
    pub skipped: bool,
}

impl RetrievalResult {
    pub fn ok(source: SourceKind, pool: Vec<Candidate>, elapsed_ms: u64) -> Self {
        Self {
            source,
            candidates: pool.clone(),
            pool,
            elapsed_ms,
            error: None,
            timed_out: false,
            skipped: false,
        }
    }

    /// Timed out; keeps whatever partial pool was obtained
    pub fn timed_out(source: SourceKind, partial: Vec<Candidate>, elapsed_ms: u64) -> Self {
        Self {
            source,
            candidates: partial.clone(),
            pool: partial,
            elapsed_ms,
            error: None,
            timed_out: true,
            skipped: false,
        }
    }

    /// Hard backend failure; never carries candidates
    pub fn failed(source: SourceKind, error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            source,
            candidates: Vec::new(),
            pool: Vec::new(),
            elapsed_ms,
            error: Some(error.into()),
            timed_out: false,
            skipped: false,
        }
    }

    pub fn skipped(source: SourceKind) -> Self {
        Self {
            source,
            candidates: Vec::new(),
            pool: Vec::new(),
            elapsed_ms: 0,
            error: None,
            timed_out: false,
            skipped: true,
        }
    }

    /// Cut the returned candidates to `k`; the pool keeps the rest
    pub fn limited_to(mut self, k: usize) -> Self {
        self.candidates.truncate(k);
        self
    }

    /// Candidates usable downstream; timeouts and failures contribute none
    pub fn usable_pool(&self) -> &[Candidate] {
        if self.timed_out || self.error.is_some() {
            &[]
        } else {
            &self.pool[..]
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Completed without timeout or error
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.error.is_none() && !self.skipped
    }

    /// Highest similarity in the result, if any
    pub fn top_similarity(&self) -> Option<f32> {
        self.candidates
            .iter()
            .map(|c| c.similarity_score)
            .fold(None, |acc, s| Some(acc.map_or(s, |a: f32| a.max(s))))
    }
}
