//! Bounded exponential backoff for upstream requests

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Retry schedule shared by buffered and streaming completions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; values below 1 are raised to 1
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Wait after failed attempt `attempt` (0-based): `base * 2^attempt`, no jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts run out
    ///
    /// The closure receives the 0-based attempt index. Only errors whose
    /// [`is_transient`](crate::KbgateError::is_transient) returns true are retried.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut state = RetryState::new(self.max_attempts);

        loop {
            let attempt = state.attempt();
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && state.has_remaining() => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt + 1,
                        self.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    state.advance();
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!("Giving up after {} attempts: {}", attempt + 1, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Attempt counter for one logical request
#[derive(Debug, Clone, Copy)]
pub struct RetryState {
    attempt: u32,
    max_attempts: u32,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
        }
    }

    /// Current 0-based attempt index
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether another attempt is allowed after the current one
    pub fn has_remaining(&self) -> bool {
        self.attempt + 1 < self.max_attempts
    }

    pub fn advance(&mut self) {
        self.attempt += 1;
    }
}
