//! Candidate re-ranking

pub mod scorer;

pub use scorer::{RankConfig, RankedCandidate, Ranker};
