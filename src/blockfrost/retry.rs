// Retry policy for indexer requests.
// Retries transient failures with a linear backoff of initial_delay * attempt.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::error::{IndexerError, Result};

/// Bounded retry with linear backoff.
///
/// Only transient errors (network failures, 5xx, 429) are retried; anything
/// else is returned from the attempt that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// `attempts` counts the first try; values below 1 are raised to 1.
    pub fn new(attempts: u32, initial_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            initial_delay,
        }
    }

    /// No retries at all.
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay * attempt
    }

    /// Run `operation` until it succeeds, fails permanently or attempts run out.
    ///
    /// The closure receives the 1-based attempt number. Exhaustion yields
    /// [`IndexerError::RetriesExhausted`] wrapping the last error.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= self.attempts => {
                    return Err(IndexerError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient indexer error, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
