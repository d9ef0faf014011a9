//! OpenAI chat completions client.

use super::retry::{RetryConfig, retrying};
use super::{BackendFuture, ChatBackend, CompletionRequest, HttpConfig, endpoint, request_error};
use crate::error::ProviderError;
use crate::settings::ApiProvider;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, trace};

const PROVIDER: &str = "OpenAI";

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    /// Reasoning models reject `max_tokens` and a non-default temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize, Debug)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorBody>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawMessage,
}

#[derive(Deserialize, Debug)]
struct RawMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    message: String,
}

#[derive(Deserialize, Debug)]
struct UsageInfo {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

fn is_reasoning_model(model: &str) -> bool {
    let name = model.rsplit('/').next().unwrap_or(model);
    ["o1", "o3", "o4"].iter().any(|p| name.starts_with(p))
}

fn build_body<'a>(model: &'a str, request: &'a CompletionRequest) -> ChatBody<'a> {
    let mut messages = Vec::with_capacity(2);
    if !request.system.is_empty() {
        messages.push(WireMessage {
            role: "system",
            content: &request.system,
        });
    }
    messages.push(WireMessage {
        role: "user",
        content: &request.user,
    });

    if is_reasoning_model(model) {
        ChatBody {
            model,
            messages,
            max_tokens: None,
            max_completion_tokens: Some(request.max_tokens),
            temperature: None,
        }
    } else {
        ChatBody {
            model,
            messages,
            max_tokens: Some(request.max_tokens),
            max_completion_tokens: None,
            temperature: Some(request.temperature),
        }
    }
}

/// Extract the reply text from a success-status body.
fn parse_response(text: &str) -> Result<String, ProviderError> {
    let parsed: RawChatResponse = serde_json::from_str(text).map_err(|e| ProviderError::Malformed {
        provider: PROVIDER,
        message: e.to_string(),
    })?;

    if let Some(err) = parsed.error {
        return Err(ProviderError::Api {
            provider: PROVIDER,
            message: err.message,
        });
    }

    if let Some(usage) = &parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
        );
    }

    parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message.content)
        .filter(|s| !s.trim().is_empty())
        .ok_or(ProviderError::Empty { provider: PROVIDER })
}

// ── Client ─────────────────────────────────────────────────────────

/// Async client for `POST /v1/chat/completions`.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
    retry: RetryConfig,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        config: &HttpConfig,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: config.build_client(PROVIDER)?,
            api_key: api_key.into(),
            model: model.into(),
            url: endpoint(&config.openai_base_url, "/v1/chat/completions"),
            retry: config.retry.clone(),
        })
    }

    async fn send(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = build_body(&self.model, request);
        debug!(
            "OpenAI request: model={}, max_tokens={}, prompt={} chars",
            self.model,
            request.max_tokens,
            request.user.len()
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(&body).map_or(0, |s| s.len())
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| request_error(PROVIDER, e))?;
        debug!(
            "OpenAI response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body: text,
            });
        }
        parse_response(&text)
    }
}

impl ChatBackend for OpenAiClient {
    fn provider(&self) -> ApiProvider {
        ApiProvider::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> BackendFuture<'a> {
        Box::pin(retrying(&self.retry, move || self.send(request)))
    }
}
