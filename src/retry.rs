//! Retry with bounded backoff and jitter
//!
//! Only errors classified as transient (see [`crate::error::ErrorKind`]) are
//! retried; everything else is returned on the first failure.

use crate::error::Result;
use crate::types::BackoffType;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry configuration shared by the HTTP client and the search store
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for a single delay (before jitter)
    pub max_backoff: Duration,
    /// How the delay grows between attempts
    pub backoff_type: BackoffType,
    /// Upper bound of the uniformly random extra delay
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(4),
            backoff_type: BackoffType::Exponential,
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set max retries
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set backoff configuration
    #[must_use]
    pub fn with_backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.backoff_type = backoff_type;
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Set jitter
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Deterministic part of the delay for a given (zero-based) retry
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let delay = match self.backoff_type {
            BackoffType::Constant => self.initial_backoff,
            BackoffType::Linear => self.initial_backoff.saturating_mul(attempt + 1),
            BackoffType::Exponential => {
                let factor = 2u32.saturating_pow(attempt);
                self.initial_backoff.saturating_mul(factor)
            }
        };

        std::cmp::min(delay, self.max_backoff)
    }

    /// Delay for a given retry, including jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter.is_zero() {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        base + Duration::from_millis(extra)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// The last error is returned once the ceiling is reached.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = e.retry_after().unwrap_or_else(|| self.delay_for(attempt));
                    warn!(
                        "{what} failed ({e}), attempt {}/{}, retrying in {delay:?}",
                        attempt + 1,
                        self.max_retries + 1
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
