use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::RemoteError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Permanent failure, or a transient one that exhausted its attempts.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("cancelled")]
    Cancelled,
}

/// Exponential backoff with jitter for transient remote failures.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u16 {
        self.config.max_attempts.max(1)
    }

    /// Run `call` until it succeeds, fails permanently, runs out of attempts
    /// or `cancel` fires. Rate-limit hints override the computed delay.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt: u16 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(CallError::Cancelled);
            }
            attempt = attempt.saturating_add(1);

            let error = match call().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_transient() {
                return Err(CallError::Remote(error));
            }
            if attempt >= self.max_attempts() {
                warn!(operation, attempt, %error, "giving up after repeated transient failures");
                return Err(CallError::Remote(error));
            }

            let delay = self.delay_for(attempt, error.retry_after());
            debug!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                %error,
                "transient remote failure; backing off"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CallError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Delay after the `attempt`-th failed call (1-based).
    pub fn delay_for(&self, attempt: u16, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint.min(self.config.backoff_max());
        }
        Duration::from_millis(self.jittered_delay_ms(self.base_delay_ms(attempt)))
    }

    fn base_delay_ms(&self, attempt: u16) -> u64 {
        if attempt == 0 {
            return 0;
        }

        let exp = i32::from(attempt.saturating_sub(1).min(32));
        let scaled = (self.config.backoff_base_ms as f64) * 2f64.powi(exp);
        let capped = scaled.min(self.config.backoff_max_ms as f64);
        capped.max(0.0) as u64
    }

    fn jittered_delay_ms(&self, anchor_ms: u64) -> u64 {
        if anchor_ms == 0 {
            return 0;
        }

        let max_ms = self.config.backoff_max_ms as f64;
        let jitter_ratio = f64::from(self.config.jitter_ratio.max(0.0));
        let jitter_span = ((anchor_ms as f64) * jitter_ratio)
            .max(self.config.jitter_min_ms as f64)
            .min(max_ms);

        let lower = 0f64.max(anchor_ms as f64 - jitter_span);
        let upper = (anchor_ms as f64 + jitter_span).min(max_ms);
        if upper <= lower {
            return lower.round() as u64;
        }

        rand::rng().random_range(lower..=upper).round() as u64
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
