//! Retry with exponential backoff for transient provider failures.
//!
//! Only rate limits (429), gateway/server errors (500, 502, 503, 504) and
//! transport failures are retried. Authentication and request errors fail
//! immediately.

use crate::error::ProviderError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = single attempt).
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-indexed), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }
}

/// Whether `err` is worth retrying.
pub fn is_transient(err: &ProviderError) -> bool {
    match err {
        ProviderError::Request { .. } => true,
        ProviderError::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
        ProviderError::Api { .. } | ProviderError::Malformed { .. } | ProviderError::Empty { .. } => {
            false
        }
    }
}

/// Run `call` until it succeeds, fails permanently, or retries run out.
pub async fn retrying<F, Fut>(config: &RetryConfig, mut call: F) -> Result<String, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Err(e) if attempt < config.max_retries && is_transient(&e) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "Transient provider failure (attempt {}/{}), retrying in {:.1}s: {e}",
                    attempt + 1,
                    config.max_retries + 1,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
