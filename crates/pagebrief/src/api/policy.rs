//! Token budgets per provider and model.

use crate::settings::ApiProvider;

/// Fraction of the context window a single request may fill with content.
pub const SAFE_FRACTION: f64 = 0.9;

/// Output tokens for single-call summaries, syntheses, and answers.
pub const SUMMARY_MAX_TOKENS: u32 = 2048;

/// Output tokens for each chunk summary.
pub const CHUNK_MAX_TOKENS: u32 = 1024;

/// Context window for `model`, matched on the name after any `org/` prefix.
///
/// Unknown OpenAI models get 128k; unknown Anthropic models 100k.
pub fn context_window_for_model(provider: ApiProvider, model: &str) -> usize {
    let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();
    match provider {
        ApiProvider::OpenAi => {
            if name.starts_with("gpt-4.1") {
                1_047_576
            } else if name.starts_with("gpt-3.5") {
                16_385
            } else if ["o1", "o3", "o4"].iter().any(|p| name.starts_with(p)) {
                200_000
            } else {
                // gpt-4o, gpt-4-turbo and anything newer default here.
                128_000
            }
        }
        ApiProvider::Anthropic => {
            if name.starts_with("claude") {
                200_000
            } else {
                100_000
            }
        }
    }
}

/// How much content one request may carry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenPolicy {
    pub context_window: usize,
    pub safe_fraction: f64,
    pub summary_max_tokens: u32,
    pub chunk_max_tokens: u32,
}

impl TokenPolicy {
    pub fn new(context_window: usize) -> Self {
        Self {
            context_window,
            safe_fraction: SAFE_FRACTION,
            summary_max_tokens: SUMMARY_MAX_TOKENS,
            chunk_max_tokens: CHUNK_MAX_TOKENS,
        }
    }

    pub fn for_model(provider: ApiProvider, model: &str) -> Self {
        Self::new(context_window_for_model(provider, model))
    }

    pub fn with_safe_fraction(mut self, fraction: f64) -> Self {
        self.safe_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Tokens of content that fit in one request.
    pub fn safe_budget(&self) -> usize {
        ((self.context_window as f64 * self.safe_fraction) as usize).max(1)
    }
}
