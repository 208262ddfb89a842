//! Retry manager with exponential backoff
//!
//! Used by the HTTP adapters (embedding, generation, web search). Only
//! transient failures are retried; the last error is returned once the
//! attempt budget is spent.

use crate::errors::{KnowledgeError, Result};
use std::time::Duration;
use tokio::time::sleep;

/// Maximum number of attempts, including the first one
pub const MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff
const BASE_DELAY_MS: u64 = 200;

/// Maximum delay cap
const MAX_DELAY_MS: u64 = 2000;

/// Retry manager with exponential backoff and jitter
#[derive(Debug, Clone)]
pub struct RetryManager {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    enable_jitter: bool,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryManager {
    pub fn new() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Create retry manager with custom settings
    pub fn with_config(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// A manager that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self::with_config(1, 0)
    }

    /// Execute operation with retry logic
    pub async fn execute_with_retry<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;

                    if !Self::is_retryable(&e) || attempt >= self.max_attempts {
                        if attempt > 1 {
                            tracing::warn!(
                                operation = operation_name,
                                attempts = attempt,
                                error = %e,
                                "giving up after retries"
                            );
                        }
                        return Err(e);
                    }

                    let delay = self.calculate_delay(attempt - 1);
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying transient failure"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Delay before the retry following attempt number `attempt` (0-based)
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let delay_ms = exponential_delay.min(self.max_delay_ms);

        // ±25% jitter
        let final_delay = if self.enable_jitter && delay_ms > 0 {
            let jitter = (delay_ms / 4) as i64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter as f64;
            ((delay_ms as i64) + random_jitter as i64).max(0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    /// Upper bound on total sleeping across all retries
    pub fn max_total_wait_time(&self) -> Duration {
        let total_ms: u64 = (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| {
                self.base_delay_ms
                    .saturating_mul(2u64.saturating_pow(attempt))
                    .min(self.max_delay_ms)
            })
            .sum();
        Duration::from_millis(total_ms)
    }

    fn is_retryable(error: &KnowledgeError) -> bool {
        error.is_transient()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
