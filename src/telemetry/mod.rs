//! Telemetry for faqbuddy
//!
//! - `StageTimings`: per-request millisecond breakdown returned to callers
//! - `PipelineTelemetry`: process-wide counters shared by all requests
//! - `init_logging`: tracing subscriber setup for the binary

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::types::SourceKind;

/// Milliseconds spent in each pipeline stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub embed_ms: u64,
    pub retrieve_ms: u64,
    pub rank_ms: u64,
    pub build_context_ms: u64,
    pub score_ms: u64,
    pub web_fallback_ms: u64,
    pub generate_ms: u64,
    pub total_ms: u64,
}

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    RequestCompleted {
        total_ms: u64,
        confidence: f32,
        timestamp: Instant,
    },
    SourceTimedOut {
        source: SourceKind,
        timestamp: Instant,
    },
    SourceFailed {
        source: SourceKind,
        timestamp: Instant,
    },
    OverallTimeout {
        timestamp: Instant,
    },
    WebFallback {
        results: usize,
        timestamp: Instant,
    },
    CacheLookup {
        hit: bool,
        timestamp: Instant,
    },
    Degraded {
        reason: String,
        timestamp: Instant,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryStats {
    pub requests: usize,
    pub web_fallbacks: usize,
    pub degraded: usize,
    pub overall_timeouts: usize,
    pub documents_timeouts: usize,
    pub faq_timeouts: usize,
    pub documents_errors: usize,
    pub faq_errors: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub total_latency_ms: u64,
}

impl TelemetryStats {
    pub fn average_latency_ms(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.requests as f64
        }
    }
}

/// Maximum events kept for inspection
const MAX_RECENT_EVENTS: usize = 256;

/// Telemetry collector
#[derive(Clone)]
pub struct PipelineTelemetry {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

impl PipelineTelemetry {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event; a poisoned lock drops the event
    pub fn record(&self, event: TelemetryEvent) {
        if let Ok(mut stats) = self.stats.lock() {
            match &event {
                TelemetryEvent::RequestCompleted { total_ms, .. } => {
                    stats.requests += 1;
                    stats.total_latency_ms += total_ms;
                }
                TelemetryEvent::SourceTimedOut { source, .. } => match source {
                    SourceKind::Document => stats.documents_timeouts += 1,
                    SourceKind::Faq => stats.faq_timeouts += 1,
                },
                TelemetryEvent::SourceFailed { source, .. } => match source {
                    SourceKind::Document => stats.documents_errors += 1,
                    SourceKind::Faq => stats.faq_errors += 1,
                },
                TelemetryEvent::OverallTimeout { .. } => stats.overall_timeouts += 1,
                TelemetryEvent::WebFallback { .. } => stats.web_fallbacks += 1,
                TelemetryEvent::CacheLookup { hit, .. } => {
                    if *hit {
                        stats.cache_hits += 1;
                    } else {
                        stats.cache_misses += 1;
                    }
                }
                TelemetryEvent::Degraded { .. } => stats.degraded += 1,
            }
        }

        if let Ok(mut events) = self.events.lock() {
            if events.len() >= MAX_RECENT_EVENTS {
                events.remove(0);
            }
            events.push(event);
        }
    }

    pub fn get_stats(&self) -> TelemetryStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        match self.events.lock() {
            Ok(events) => {
                let start = events.len().saturating_sub(n);
                events[start..].to_vec()
            }
            Err(_) => Vec::new(),
        }
    }
}

impl Default for PipelineTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the directive derived from verbosity. Calling this
/// twice is harmless; the second call is ignored.
pub fn init_logging(directive: &str, color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(color)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_creation() {
        let telemetry = PipelineTelemetry::new();
        assert_eq!(telemetry.event_count(), 0);
        assert_eq!(telemetry.get_stats().requests, 0);
        assert_eq!(telemetry.get_stats().average_latency_ms(), 0.0);
    }

    #[test]
    fn test_request_and_source_events() {
        let telemetry = PipelineTelemetry::new();
        telemetry.record(TelemetryEvent::RequestCompleted {
            total_ms: 120,
            confidence: 0.7,
            timestamp: Instant::now(),
        });
        telemetry.record(TelemetryEvent::RequestCompleted {
            total_ms: 80,
            confidence: 1.0,
            timestamp: Instant::now(),
        });
        telemetry.record(TelemetryEvent::SourceTimedOut {
            source: SourceKind::Faq,
            timestamp: Instant::now(),
        });

        let stats = telemetry.get_stats();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.faq_timeouts, 1);
        assert_eq!(stats.documents_timeouts, 0);
        assert!((stats.average_latency_ms() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cache_counters() {
        let telemetry = PipelineTelemetry::new();
        for hit in [true, false, true] {
            telemetry.record(TelemetryEvent::CacheLookup {
                hit,
                timestamp: Instant::now(),
            });
        }
        let stats = telemetry.get_stats();
        assert_eq!(stats.cache_hits, 2);
        assert_eq!(stats.cache_misses, 1);
    }

    #[test]
    fn test_recent_events_bounded() {
        let telemetry = PipelineTelemetry::new();
        for _ in 0..(MAX_RECENT_EVENTS + 10) {
            telemetry.record(TelemetryEvent::OverallTimeout {
                timestamp: Instant::now(),
            });
        }
        assert_eq!(telemetry.event_count(), MAX_RECENT_EVENTS);
        assert_eq!(telemetry.recent_events(3).len(), 3);
        assert_eq!(telemetry.get_stats().overall_timeouts, MAX_RECENT_EVENTS + 10);
    }
}
