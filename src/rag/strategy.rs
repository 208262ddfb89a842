//! Retrieval execution strategy
//!
//! `choose_strategy` is a pure function of the query, its product focus and
//! the configured policy. The default policy always runs both sources in
//! parallel; the adaptive policy stages complex queries (documents first,
//! FAQ only when documents come back weak).

use serde::{Deserialize, Serialize};

use crate::config::{PipelineConfig, StrategyMode};
use crate::rag::products::ProductFocus;
use crate::types::Query;

/// How the two retrievers are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Parallel,
    Sequential,
}

impl ExecutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
        }
    }
}

/// Tunable complexity policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyPolicy {
    pub mode: StrategyMode,
    pub complexity_threshold: usize,
}

impl Default for StrategyPolicy {
    fn default() -> Self {
        Self {
            mode: StrategyMode::AlwaysParallel,
            complexity_threshold: 10,
        }
    }
}

impl From<&PipelineConfig> for StrategyPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            mode: config.strategy_mode,
            complexity_threshold: config.complexity_threshold,
        }
    }
}

/// Conjunctions that usually join separate intents (English and Portuguese)
const CONJUNCTIONS: &[&str] = &["and", "or", "e", "ou"];

/// Weight of each conjunction in the complexity score
const CONJUNCTION_WEIGHT: usize = 2;

/// Word count, plus words longer than 8 characters, plus `?` and `!` marks,
/// plus a weighted count of conjunctions
pub fn complexity_score(text: &str) -> usize {
    let words: Vec<&str> = text.split_whitespace().collect();
    let long_words = words.iter().filter(|w| w.chars().count() > 8).count();
    let marks = text.chars().filter(|c| *c == '?' || *c == '!').count();
    let conjunctions = words
        .iter()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| CONJUNCTIONS.contains(&w.as_str()))
        .count();
    words.len() + long_words + marks + conjunctions * CONJUNCTION_WEIGHT
}

/// Pick parallel or staged execution
pub fn choose_strategy(query: &Query, focus: &ProductFocus, policy: &StrategyPolicy) -> ExecutionStrategy {
    match policy.mode {
        StrategyMode::AlwaysParallel => ExecutionStrategy::Parallel,
        StrategyMode::Adaptive => {
            let complex = complexity_score(query.text()) >= policy.complexity_threshold
                || focus.len() >= 2;
            if complex {
                ExecutionStrategy::Sequential
            } else {
                ExecutionStrategy::Parallel
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::products::ProductCatalog;

    fn adaptive() -> StrategyPolicy {
        StrategyPolicy {
            mode: StrategyMode::Adaptive,
            complexity_threshold: 10,
        }
    }

    #[test]
    fn test_complexity_score() {
        // 4 words + "cancellation" + one '?'
        assert_eq!(complexity_score("what is cancellation policy?"), 6);
        assert_eq!(complexity_score(""), 0);
    }

    #[test]
    fn test_conjunctions_raise_complexity() {
        // 5 words + one '?' + two conjunctions at weight 2
        assert_eq!(complexity_score("fees and limits or rates?"), 10);
        // Portuguese "e" counts; "ebook" does not
        assert_eq!(complexity_score("taxas e prazos"), 5);
        assert_eq!(complexity_score("ebook prazos"), 2);

        let query = Query::new("fees and limits or rates?");
        assert_eq!(
            choose_strategy(&query, &ProductFocus::default(), &adaptive()),
            ExecutionStrategy::Sequential
        );
    }

    #[test]
    fn test_default_policy_is_parallel() {
        let query = Query::new(
            "Can you explain in detail every single fee that applies to international transactions?",
        );
        let strategy = choose_strategy(&query, &ProductFocus::default(), &StrategyPolicy::default());
        assert_eq!(strategy, ExecutionStrategy::Parallel);
    }

    #[test]
    fn test_adaptive_short_query_is_parallel() {
        let query = Query::new("pix fees?");
        let focus = ProductCatalog::default().detect(&query);
        assert_eq!(choose_strategy(&query, &focus, &adaptive()), ExecutionStrategy::Parallel);
    }

    #[test]
    fn test_adaptive_complex_query_is_sequential() {
        let long = Query::new(
            "Can you explain in detail every single fee that applies to international transactions?",
        );
        assert_eq!(
            choose_strategy(&long, &ProductFocus::default(), &adaptive()),
            ExecutionStrategy::Sequential
        );

        let multi = Query::new("pix or boleto?");
        let focus = ProductCatalog::default().detect(&multi);
        assert_eq!(choose_strategy(&multi, &focus, &adaptive()), ExecutionStrategy::Sequential);
    }

    #[test]
    fn test_choose_strategy_is_deterministic() {
        let query = Query::new("how do refunds work for boleto payments and pix transfers?");
        let focus = ProductCatalog::default().detect(&query);
        let first = choose_strategy(&query, &focus, &adaptive());
        for _ in 0..10 {
            assert_eq!(choose_strategy(&query, &focus, &adaptive()), first);
        }
    }
}
