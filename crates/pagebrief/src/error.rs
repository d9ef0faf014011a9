//! Error types for the coordination core.
//!
//! Each concern gets its own enum so callers can match on the failure that
//! matters to them. [`CoreError`] unifies them at the router boundary, where
//! every error is flattened into a `{ "error": "<message>" }` response.

use crate::TabId;

/// The selected provider is not usable as configured.
///
/// Raised before any network traffic happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("No API key configured for {provider}. Add one in the extension options.")]
    MissingApiKey { provider: &'static str },

    #[error("No model configured for {provider}.")]
    MissingModel { provider: &'static str },
}

/// A call to an LLM backend failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Transport failure: DNS, connection reset, timeout.
    #[error("{provider} request failed: {message}")]
    Request {
        provider: &'static str,
        message: String,
    },

    /// The API answered with a non-success status code.
    #[error("{provider} API HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// The API returned an explicit error object in a success response.
    #[error("{provider} API error: {message}")]
    Api {
        provider: &'static str,
        message: String,
    },

    /// The body could not be parsed into the expected shape.
    #[error("{provider} returned a malformed response: {message}")]
    Malformed {
        provider: &'static str,
        message: String,
    },

    /// The body parsed but contained no text.
    #[error("{provider} returned an empty response")]
    Empty { provider: &'static str },
}

/// The host could not provide page content for a tab.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("No active tab found")]
    NoActiveTab,

    #[error("Could not read page content for tab {tab_id}: {message}")]
    Failed { tab_id: TabId, message: String },
}

/// Persistent key-value store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize stored value '{key}': {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Rejected edits to saved prompts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("prompt '{0}' not found")]
    PromptNotFound(String),

    #[error("prompt '{0}' is the default prompt and cannot be deleted")]
    DeleteDefault(String),

    #[error("prompt template must contain the {{content}} placeholder")]
    MissingPlaceholder,

    #[error("prompt name must not be empty")]
    EmptyName,
}

/// Any failure surfaced by the coordination core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_names_provider() {
        let err = CoreError::from(ConfigurationError::MissingApiKey { provider: "OpenAI" });
        assert!(err.to_string().contains("No API key configured for OpenAI"));
    }

    #[test]
    fn status_error_carries_code_and_body() {
        let err = ProviderError::Status {
            provider: "Anthropic",
            status: 429,
            body: "rate limited".into(),
        };
        assert_eq!(err.to_string(), "Anthropic API HTTP 429: rate limited");
    }

    #[test]
    fn placeholder_message_renders_braces() {
        assert_eq!(
            SettingsError::MissingPlaceholder.to_string(),
            "prompt template must contain the {content} placeholder"
        );
    }
}
