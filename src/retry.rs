//! Retry Logic with Exponential Backoff
//!
//! Wraps node and price API calls. Only errors classified as retryable by
//! `OperatorError::is_retryable` are repeated; everything else is returned
//! from the first failing attempt.

use crate::errors::{OperatorError, OperatorResult};
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::warn;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total calls made before giving up, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Backoff multiplier
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// A single attempt; every error is returned as-is
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based)
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `f` until it succeeds, fails fatally, or the attempts are used up
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, mut f: F) -> OperatorResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OperatorError>>,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match f().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if attempt >= attempts {
            warn!("{} gave up after {} attempts: {}", operation, attempt, err);
            return Err(err);
        }

        let delay = config.backoff(attempt);
        warn!(
            "{} attempt {}/{} failed ({}), retrying in {:?}",
            operation, attempt, attempts, err, delay
        );
        sleep(delay).await;
        attempt += 1;
    }
}
