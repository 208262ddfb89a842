//! Shared caches
//!
//! - Store: generic TTL + byte-capped LRU cache keyed by content hash
//! - Manager: embeddings, generated answers and retrieval pools

pub mod store;
pub mod manager;

pub use store::{content_key, CacheEntry, CacheStats, CacheStore, CacheWeight};
pub use manager::{CacheManager, CacheManagerStats};
