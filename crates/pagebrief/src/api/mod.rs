//! HTTP layer for the two LLM vendors.
//!
//! Everything here speaks in single completion calls; chunking and
//! synthesis live one level up in [`provider`](crate::provider).
//!
//! - [`openai`]: chat completions client.
//! - [`anthropic`]: messages client.
//! - [`policy`]: per-model context windows and the safe token budget.
//! - [`retry`]: optional backoff for transient failures (429, 5xx,
//!   transport errors). Off by default.

pub mod anthropic;
pub mod openai;
pub mod policy;
pub mod retry;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;
pub use policy::{TokenPolicy, context_window_for_model};
pub use retry::RetryConfig;

use crate::error::ProviderError;
use crate::settings::ApiProvider;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default delay between consecutive chunk calls.
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_secs(1);

const USER_AGENT: &str = concat!("pagebrief/", env!("CARGO_PKG_VERSION"));

/// Boxed future returned by [`ChatBackend::complete`].
pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>>;

/// One system + user exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens,
            temperature: 0.3,
        }
    }
}

/// A single-call text completion backend.
///
/// Uses a boxed future so the trait stays dyn-compatible.
pub trait ChatBackend: Send + Sync {
    fn provider(&self) -> ApiProvider;

    fn model(&self) -> &str;

    /// Send one request and return the reply text.
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> BackendFuture<'a>;
}

/// Transport settings shared by both clients.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub openai_base_url: String,
    pub anthropic_base_url: String,
    /// Per-request timeout. A timed-out call fails with a `ProviderError`.
    pub timeout: Duration,
    /// Sleep between chunk calls of one summarization.
    pub pacing_delay: Duration,
    pub retry: RetryConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            openai_base_url: OPENAI_BASE_URL.into(),
            anthropic_base_url: ANTHROPIC_BASE_URL.into(),
            timeout: DEFAULT_TIMEOUT,
            pacing_delay: DEFAULT_PACING_DELAY,
            retry: RetryConfig::default(),
        }
    }
}

impl HttpConfig {
    pub fn with_openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.openai_base_url = url.into();
        self
    }

    pub fn with_anthropic_base_url(mut self, url: impl Into<String>) -> Self {
        self.anthropic_base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pacing_delay(mut self, delay: Duration) -> Self {
        self.pacing_delay = delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) fn build_client(&self, provider: &'static str) -> Result<reqwest::Client, ProviderError> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProviderError::Request {
                provider,
                message: format!("failed to build HTTP client: {e}"),
            })
    }
}

/// Join a base URL and an absolute path without doubling the slash.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}{path}", base.trim_end_matches('/'))
}

/// Map a reqwest transport error.
pub(crate) fn request_error(provider: &'static str, e: reqwest::Error) -> ProviderError {
    let message = if e.is_timeout() {
        format!("timed out: {e}")
    } else {
        e.to_string()
    };
    ProviderError::Request { provider, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(
            endpoint("http://127.0.0.1:9000/", "/v1/messages"),
            "http://127.0.0.1:9000/v1/messages"
        );
        assert_eq!(
            endpoint(OPENAI_BASE_URL, "/v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn http_config_builders() {
        let config = HttpConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_pacing_delay(Duration::ZERO)
            .with_anthropic_base_url("http://localhost:1");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.pacing_delay, Duration::ZERO);
        assert_eq!(config.anthropic_base_url, "http://localhost:1");
        assert_eq!(config.openai_base_url, OPENAI_BASE_URL);
    }
}
