//! Confidence scoring
//!
//! A deterministic weighted sum of three signals: documents present, FAQ
//! present, and whether the average top similarity clears the relevance
//! threshold. Weights are validated to sum to 1.0 at config load.

use serde::{Deserialize, Serialize};

use crate::config::ConfidenceConfig;

/// Per-signal contributions of one score
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub documents: f32,
    pub faq: f32,
    pub relevance: f32,
    pub average_top_similarity: f32,
    pub score: f32,
}

/// Confidence scorer
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    config: ConfidenceConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    /// Score in [0, 1]
    pub fn score(&self, has_doc_results: bool, has_faq_results: bool, average_top_similarity: f32) -> f32 {
        self.breakdown(has_doc_results, has_faq_results, average_top_similarity)
            .score
    }

    pub fn breakdown(
        &self,
        has_doc_results: bool,
        has_faq_results: bool,
        average_top_similarity: f32,
    ) -> ConfidenceBreakdown {
        let c = &self.config;
        let documents = if has_doc_results { c.documents_weight } else { 0.0 };
        let faq = if has_faq_results { c.faq_weight } else { 0.0 };
        let relevant = (has_doc_results || has_faq_results)
            && !average_top_similarity.is_nan()
            && average_top_similarity >= c.relevance_threshold;
        let relevance = if relevant { c.relevance_weight } else { 0.0 };

        ConfidenceBreakdown {
            documents,
            faq,
            relevance,
            average_top_similarity,
            score: (documents + faq + relevance).clamp(0.0, 1.0),
        }
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(ConfidenceConfig::default())
    }
}

/// Mean of the top similarity of each source that returned something
pub fn average_top_similarity<I>(top_scores: I) -> f32
where
    I: IntoIterator<Item = Option<f32>>,
{
    let present: Vec<f32> = top_scores.into_iter().flatten().collect();
    if present.is_empty() {
        0.0
    } else {
        present.iter().sum::<f32>() / present.len() as f32
    }
}
