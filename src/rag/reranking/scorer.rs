//! Ranker: deduplication, product affinity and greedy MMR selection

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::PipelineConfig;
use crate::rag::products::ProductFocus;
use crate::rag::similarity::{cosine_similarity, jaccard_similarity, token_set};
use crate::types::Candidate;

/// Scores closer than this are treated as tied
const TIE_EPSILON: f64 = 1e-9;

/// Ranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankConfig {
    /// Final list size
    pub k: usize,
    /// Relevance weight in [0, 1]; 1.0 ignores diversity
    pub mmr_lambda: f32,
    /// Added to the relevance of candidates in the product focus
    pub product_affinity_bonus: f32,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            k: 3,
            mmr_lambda: 0.5,
            product_affinity_bonus: 0.1,
        }
    }
}

impl From<&PipelineConfig> for RankConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            k: config.k,
            mmr_lambda: config.mmr_lambda,
            product_affinity_bonus: config.product_affinity_bonus,
        }
    }
}

/// Candidate with its ranking scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub original_score: f32,
    /// MMR score at the moment the candidate was selected
    pub reranked_score: f32,
    pub affinity_bonus: f32,
}

struct PoolEntry {
    candidate: Candidate,
    relevance: f64,
    bonus: f32,
    tokens: HashSet<String>,
}

/// Re-ranker for one source's candidate pool
pub struct Ranker {
    config: RankConfig,
}

impl Ranker {
    pub fn new() -> Self {
        Self {
            config: RankConfig::default(),
        }
    }

    pub fn with_config(config: RankConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankConfig {
        &self.config
    }

    /// Rank a pool into at most `k` diverse, deduplicated candidates
    pub fn rank(&self, pool: Vec<Candidate>, focus: &ProductFocus) -> Vec<RankedCandidate> {
        let k = self.config.k;
        if pool.is_empty() || k == 0 {
            return Vec::new();
        }

        let lambda = f64::from(self.config.mmr_lambda.clamp(0.0, 1.0));
        let mut remaining = self.prepare(pool, focus);
        let mut selected: Vec<(PoolEntry, f64)> = Vec::with_capacity(k.min(remaining.len()));

        while selected.len() < k && !remaining.is_empty() {
            let mut best_idx = 0;
            let mut best_score = f64::NEG_INFINITY;

            for (i, entry) in remaining.iter().enumerate() {
                let max_sim = selected
                    .iter()
                    .map(|(chosen, _)| pairwise_similarity(entry, chosen))
                    .fold(0.0_f64, f64::max);
                let mmr = lambda * entry.relevance - (1.0 - lambda) * max_sim;

                let better = mmr > best_score + TIE_EPSILON
                    || ((mmr - best_score).abs() <= TIE_EPSILON
                        && entry.candidate.id < remaining[best_idx].candidate.id);
                if better {
                    best_score = mmr;
                    best_idx = i;
                }
            }

            let chosen = remaining.remove(best_idx);
            selected.push((chosen, best_score));
        }

        selected
            .into_iter()
            .map(|(entry, mmr)| RankedCandidate {
                original_score: entry.candidate.similarity_score,
                reranked_score: mmr as f32,
                affinity_bonus: entry.bonus,
                candidate: entry.candidate,
            })
            .collect()
    }

    /// Deduplicate by id (first occurrence wins) and score relevance
    fn prepare(&self, pool: Vec<Candidate>, focus: &ProductFocus) -> Vec<PoolEntry> {
        let mut seen = HashSet::new();
        pool.into_iter()
            .filter(|c| seen.insert(c.id.clone()))
            .map(|candidate| {
                let bonus = if focus.matches(&candidate) {
                    self.config.product_affinity_bonus
                } else {
                    0.0
                };
                PoolEntry {
                    relevance: f64::from(candidate.similarity_score + bonus),
                    bonus,
                    tokens: token_set(&candidate.text),
                    candidate,
                }
            })
            .collect()
    }
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new()
    }
}

/// Cosine over stored vectors when both have them, token Jaccard otherwise
fn pairwise_similarity(a: &PoolEntry, b: &PoolEntry) -> f64 {
    let sim = match (&a.candidate.embedding, &b.candidate.embedding) {
        (Some(ea), Some(eb)) => cosine_similarity(ea, eb),
        _ => jaccard_similarity(&a.tokens, &b.tokens),
    };
    f64::from(sim.clamp(0.0, 1.0))
}
