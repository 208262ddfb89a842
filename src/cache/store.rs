//! TTL and size-bounded LRU cache store
//!
//! Guarantees:
//! - Total size never exceeds the configured byte cap
//! - Entries older than their TTL are never returned
//! - Insert/evict happen under one lock, so concurrent callers cannot
//!   double-count sizes
//!
//! The store is best-effort: a poisoned lock is reported as a miss.

use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::errors::{KnowledgeError, Result};
use crate::types::{Candidate, EmbeddingVector};

/// Fixed per-entry bookkeeping cost added to every size estimate
const ENTRY_OVERHEAD_BYTES: usize = 64;

/// Approximate heap footprint of a cached value
pub trait CacheWeight {
    fn weight(&self) -> usize;
}

impl CacheWeight for String {
    fn weight(&self) -> usize {
        self.len()
    }
}

impl CacheWeight for EmbeddingVector {
    fn weight(&self) -> usize {
        self.len() * std::mem::size_of::<f32>()
    }
}

impl CacheWeight for Candidate {
    fn weight(&self) -> usize {
        self.id.len()
            + self.text.len()
            + self.source_url.len()
            + self.product_tags.iter().map(String::len).sum::<usize>()
            + self.embedding.as_ref().map_or(0, |e| e.len() * std::mem::size_of::<f32>())
    }
}

impl<T: CacheWeight> CacheWeight for Vec<T> {
    fn weight(&self) -> usize {
        self.iter().map(CacheWeight::weight).sum()
    }
}

/// Build a content-addressed key: `namespace:sha256(content)`
pub fn content_key(namespace: &str, content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    format!("{}:{}", namespace, hex::encode(digest))
}

/// One cached value with its lifetime metadata
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub created_at: Instant,
    pub ttl: Duration,
    pub size_bytes: usize,
}

impl<V> CacheEntry<V> {
    /// Age strictly greater than TTL means expired
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

/// Counters and occupancy snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub rejected: u64,
    pub entries: usize,
    pub bytes: usize,
    pub cap_bytes: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct StoreInner<V> {
    entries: LruCache<String, CacheEntry<V>>,
    total_bytes: usize,
    stats: CacheStats,
}

impl<V> StoreInner<V> {
    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.pop(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        self.stats.expirations += expired.len() as u64;
        expired.len()
    }
}

/// Thread-safe TTL + LRU cache bounded by total bytes
pub struct CacheStore<V> {
    name: String,
    cap_bytes: usize,
    inner: Mutex<StoreInner<V>>,
}

impl<V: Clone + CacheWeight> CacheStore<V> {
    /// Create a store holding at most `cap_bytes` of estimated data
    pub fn new(name: impl Into<String>, cap_bytes: usize) -> Self {
        Self {
            name: name.into(),
            cap_bytes,
            inner: Mutex::new(StoreInner {
                entries: LruCache::unbounded(),
                total_bytes: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cap_bytes(&self) -> usize {
        self.cap_bytes
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner<V>>> {
        self.inner
            .lock()
            .map_err(|_| KnowledgeError::CacheUnavailable(format!("{} lock poisoned", self.name)))
    }

    /// Look up a live entry; expired or unreadable entries are misses
    pub fn get(&self, key: &str) -> Option<V> {
        match self.try_get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(cache = %self.name, error = %e, "cache read degraded to miss");
                None
            }
        }
    }

    /// Fallible lookup, for callers that want to see outages
    pub fn try_get(&self, key: &str) -> Result<Option<V>> {
        let mut inner = self.lock()?;
        let now = Instant::now();

        let expired = match inner.entries.peek(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                inner.stats.misses += 1;
                return Ok(None);
            }
        };

        if expired {
            inner.remove(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            return Ok(None);
        }

        let value = inner.entries.get(key).map(|entry| entry.value.clone());
        inner.stats.hits += 1;
        Ok(value)
    }

    /// Insert a value; returns whether it was stored
    ///
    /// Zero TTLs and values larger than the whole cap are rejected.
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) -> bool {
        let key = key.into();
        match self.try_put(key, value, ttl) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(cache = %self.name, error = %e, "cache write skipped");
                false
            }
        }
    }

    pub fn try_put(&self, key: String, value: V, ttl: Duration) -> Result<bool> {
        let size_bytes = value.weight() + key.len() + ENTRY_OVERHEAD_BYTES;
        let mut inner = self.lock()?;

        if ttl.is_zero() || size_bytes > self.cap_bytes {
            inner.stats.rejected += 1;
            return Ok(false);
        }

        let now = Instant::now();
        inner.purge_expired(now);
        inner.remove(&key);

        inner.entries.put(
            key.clone(),
            CacheEntry {
                key,
                value,
                created_at: now,
                ttl,
                size_bytes,
            },
        );
        inner.total_bytes += size_bytes;

        while inner.total_bytes > self.cap_bytes {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.total_bytes = inner.total_bytes.saturating_sub(evicted.size_bytes);
                    inner.stats.evictions += 1;
                }
                None => break,
            }
        }

        Ok(true)
    }

    /// Remove an entry; returns whether one was present
    pub fn invalidate(&self, key: &str) -> bool {
        match self.lock() {
            Ok(mut inner) => inner.remove(key).is_some(),
            Err(_) => false,
        }
    }

    pub fn clear(&self) {
        if let Ok(mut inner) = self.lock() {
            inner.entries.clear();
            inner.total_bytes = 0;
        }
    }

    /// Drop every expired entry now
    pub fn purge_expired(&self) -> usize {
        self.lock()
            .map(|mut inner| inner.purge_expired(Instant::now()))
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.lock().map(|inner| inner.total_bytes).unwrap_or(0)
    }

    pub fn stats(&self) -> CacheStats {
        match self.lock() {
            Ok(inner) => CacheStats {
                entries: inner.entries.len(),
                bytes: inner.total_bytes,
                cap_bytes: self.cap_bytes,
                ..inner.stats.clone()
            },
            Err(_) => CacheStats {
                cap_bytes: self.cap_bytes,
                ..CacheStats::default()
            },
        }
    }

    #[cfg(test)]
    fn recount_bytes(&self) -> usize {
        let inner = self.lock().unwrap();
        inner.entries.iter().map(|(_, e)| e.size_bytes).sum()
    }
}
