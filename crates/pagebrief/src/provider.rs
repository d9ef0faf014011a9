//! Summarize and answer-question on top of a single-call backend.
//!
//! [`ChunkedProvider`] is the one adapter both vendors share: content that
//! fits the model's safe budget goes out in one call; longer content is
//! split with the [`chunker`](crate::chunker), each part summarized in
//! order with a pacing delay between calls, and the part summaries merged
//! in a final synthesis call. Only the [`ChatBackend`] and the
//! [`TokenPolicy`] differ between OpenAI and Anthropic.
//!
//! [`ProviderFactory`] turns the persisted provider settings into a ready
//! provider, failing with a configuration error before any network call
//! when the active vendor has no API key.

use crate::api::policy::TokenPolicy;
use crate::api::{
    AnthropicClient, BackendFuture, ChatBackend, CompletionRequest, HttpConfig, OpenAiClient,
};
use crate::chunker::{self, estimate_tokens};
use crate::error::{ConfigurationError, CoreError, ProviderError};
use crate::prompt::{
    CHUNK_TEMPLATE, QUESTION_TEMPLATE, SUMMARY_TEMPLATE, SYNTHESIS_TEMPLATE, SYSTEM_PROMPT, render,
};
use crate::settings::{ApiProvider, ProviderSettings};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Separator placed between chunk summaries in the synthesis prompt.
pub const CHUNK_SUMMARY_SEPARATOR: &str = "\n\n---\n\n";

/// The contract the coordinator drives.
///
/// `template` is a user template; `None` selects the built-in one.
pub trait LlmProvider: Send + Sync {
    fn summarize<'a>(&'a self, content: &'a str, template: Option<&'a str>) -> BackendFuture<'a>;

    fn answer_question<'a>(
        &'a self,
        context: &'a str,
        summary: &'a str,
        question: &'a str,
        template: Option<&'a str>,
    ) -> BackendFuture<'a>;
}

// ── ChunkedProvider ────────────────────────────────────────────────

pub struct ChunkedProvider {
    backend: Box<dyn ChatBackend>,
    policy: TokenPolicy,
    pacing_delay: Duration,
}

impl ChunkedProvider {
    pub fn new(backend: Box<dyn ChatBackend>, policy: TokenPolicy) -> Self {
        Self {
            backend,
            policy,
            pacing_delay: crate::api::DEFAULT_PACING_DELAY,
        }
    }

    pub fn with_pacing_delay(mut self, delay: Duration) -> Self {
        self.pacing_delay = delay;
        self
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    async fn call(&self, prompt: String, max_tokens: u32) -> Result<String, ProviderError> {
        let request = CompletionRequest::new(SYSTEM_PROMPT, prompt, max_tokens);
        self.backend.complete(&request).await
    }

    async fn pace(&self) {
        if !self.pacing_delay.is_zero() {
            tokio::time::sleep(self.pacing_delay).await;
        }
    }

    /// Summarize `content`, chunking when it exceeds the safe budget.
    pub async fn summarize_text(
        &self,
        content: &str,
        template: Option<&str>,
    ) -> Result<String, ProviderError> {
        let budget = self.policy.safe_budget();
        let tokens = estimate_tokens(content);

        if tokens <= budget {
            debug!("Single-call summary: ~{tokens} tokens (budget {budget})");
            let prompt = render(template.unwrap_or(SUMMARY_TEMPLATE), &[("content", content)]);
            return self.call(prompt, self.policy.summary_max_tokens).await;
        }

        let start = Instant::now();
        let chunks = chunker::split(content, budget);
        let total = chunks.len().to_string();
        info!(
            "{} {}: ~{tokens} tokens exceeds budget {budget}, summarizing {total} chunks",
            self.backend.provider().display_name(),
            self.backend.model(),
        );

        let mut summaries = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                self.pace().await;
            }
            let index = (i + 1).to_string();
            let prompt = render(
                CHUNK_TEMPLATE,
                &[
                    ("index", index.as_str()),
                    ("total", total.as_str()),
                    ("content", chunk.as_str()),
                ],
            );
            let summary = self.call(prompt, self.policy.chunk_max_tokens).await?;
            debug!("Chunk {index}/{total} summarized ({} chars)", summary.len());
            summaries.push(summary);
        }

        self.pace().await;
        let joined = summaries.join(CHUNK_SUMMARY_SEPARATOR);
        let prompt = render(template.unwrap_or(SYNTHESIS_TEMPLATE), &[("content", joined.as_str())]);
        let result = self.call(prompt, self.policy.summary_max_tokens).await?;
        info!(
            "Chunked summary finished in {:.1}s ({} calls)",
            start.elapsed().as_secs_f64(),
            summaries.len() + 1
        );
        Ok(result)
    }

    /// Answer `question` about a page. Page text beyond the safe budget is
    /// truncated so the request fits in one call.
    pub async fn answer_text(
        &self,
        context: &str,
        summary: &str,
        question: &str,
        template: Option<&str>,
    ) -> Result<String, ProviderError> {
        let template = template.unwrap_or(QUESTION_TEMPLATE);
        let overhead = estimate_tokens(template) + estimate_tokens(summary) + estimate_tokens(question);
        let allowed = self.policy.safe_budget().saturating_sub(overhead);

        let context = if estimate_tokens(context) > allowed {
            let keep = allowed * chunker::CHARS_PER_TOKEN;
            warn!(
                "Question context ~{} tokens truncated to {allowed}",
                estimate_tokens(context)
            );
            context.chars().take(keep).collect::<String>()
        } else {
            context.to_string()
        };

        let prompt = render(
            template,
            &[
                ("context", context.as_str()),
                ("summary", summary),
                ("question", question),
            ],
        );
        self.call(prompt, self.policy.summary_max_tokens).await
    }
}

impl LlmProvider for ChunkedProvider {
    fn summarize<'a>(&'a self, content: &'a str, template: Option<&'a str>) -> BackendFuture<'a> {
        Box::pin(self.summarize_text(content, template))
    }

    fn answer_question<'a>(
        &'a self,
        context: &'a str,
        summary: &'a str,
        question: &'a str,
        template: Option<&'a str>,
    ) -> BackendFuture<'a> {
        Box::pin(self.answer_text(context, summary, question, template))
    }
}

// ── Factory ────────────────────────────────────────────────────────

/// Builds the provider for the currently selected vendor.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, CoreError>;
}

/// Factory for the real HTTP clients.
#[derive(Debug, Clone, Default)]
pub struct HttpProviderFactory {
    config: HttpConfig,
}

impl HttpProviderFactory {
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}

/// Key and model for the active vendor, or the configuration error.
pub fn credentials(settings: &ProviderSettings) -> Result<(&str, &str), ConfigurationError> {
    let provider = settings.api_provider;
    let key = settings.api_key(provider).trim();
    if key.is_empty() {
        return Err(ConfigurationError::MissingApiKey {
            provider: provider.display_name(),
        });
    }
    let model = settings.model(provider).trim();
    if model.is_empty() {
        return Err(ConfigurationError::MissingModel {
            provider: provider.display_name(),
        });
    }
    Ok((key, model))
}

impl ProviderFactory for HttpProviderFactory {
    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, CoreError> {
        let (key, model) = credentials(settings)?;
        let backend: Box<dyn ChatBackend> = match settings.api_provider {
            ApiProvider::OpenAi => Box::new(OpenAiClient::new(key, model, &self.config)?),
            ApiProvider::Anthropic => Box::new(AnthropicClient::new(key, model, &self.config)?),
        };
        let policy = TokenPolicy::for_model(settings.api_provider, model);
        debug!(
            "Provider ready: {} {model} (safe budget {} tokens)",
            settings.api_provider,
            policy.safe_budget()
        );
        Ok(Arc::new(
            ChunkedProvider::new(backend, policy).with_pacing_delay(self.config.pacing_delay),
        ))
    }
}
