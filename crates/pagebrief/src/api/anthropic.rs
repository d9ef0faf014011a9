//! Anthropic messages client.

use super::retry::{RetryConfig, retrying};
use super::{
    ANTHROPIC_VERSION, BackendFuture, ChatBackend, CompletionRequest, HttpConfig, endpoint,
    request_error,
};
use crate::error::ProviderError;
use crate::settings::ApiProvider;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

const PROVIDER: &str = "Anthropic";

#[derive(Serialize, Debug)]
struct MessagesBody<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [WireMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Debug)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct RawMessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    error: Option<ApiErrorBody>,
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    message: String,
}

#[derive(Deserialize, Debug)]
struct UsageInfo {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

fn build_body<'a>(model: &'a str, request: &'a CompletionRequest) -> MessagesBody<'a> {
    MessagesBody {
        model,
        system: Some(request.system.as_str()).filter(|s| !s.is_empty()),
        messages: [WireMessage {
            role: "user",
            content: &request.user,
        }],
        max_tokens: request.max_tokens,
        temperature: request.temperature,
    }
}

/// Concatenate the `text` blocks of a success-status body.
fn parse_response(text: &str) -> Result<String, ProviderError> {
    let parsed: RawMessagesResponse =
        serde_json::from_str(text).map_err(|e| ProviderError::Malformed {
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
            "Token usage: input={}, output={}",
            usage.input_tokens.unwrap_or(0),
            usage.output_tokens.unwrap_or(0),
        );
    }

    let reply: String = parsed
        .content
        .into_iter()
        .filter(|b| b.block_type == "text")
        .filter_map(|b| b.text)
        .collect();

    if reply.trim().is_empty() {
        return Err(ProviderError::Empty { provider: PROVIDER });
    }
    Ok(reply)
}

/// Async client for `POST /v1/messages`.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
    retry: RetryConfig,
}

impl AnthropicClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        config: &HttpConfig,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: config.build_client(PROVIDER)?,
            api_key: api_key.into(),
            model: model.into(),
            url: endpoint(&config.anthropic_base_url, "/v1/messages"),
            retry: config.retry.clone(),
        })
    }

    async fn send(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = build_body(&self.model, request);
        debug!(
            "Anthropic request: model={}, max_tokens={}, prompt={} chars",
            self.model,
            request.max_tokens,
            request.user.len()
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| request_error(PROVIDER, e))?;
        debug!(
            "Anthropic response: HTTP {} in {:.1}s ({} bytes)",
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

impl ChatBackend for AnthropicClient {
    fn provider(&self) -> ApiProvider {
        ApiProvider::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> BackendFuture<'a> {
        Box::pin(retrying(&self.retry, move || self.send(request)))
    }
}
