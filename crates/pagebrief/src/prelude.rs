//! Convenience re-exports for common `pagebrief` types.
//!
//! ```ignore
//! use pagebrief::prelude::*;
//! ```
//!
//! Covers wiring a [`Coordinator`] and [`Router`] together and talking to
//! them. Wire-level client types and the chunker live in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{DEFAULT_PROMPT_ID, PageContent, PageSnapshot, TabId};

// ── Errors ──────────────────────────────────────────────────────────
pub use crate::error::{
    ConfigurationError, CoreError, ExtractionError, ProviderError, SettingsError, StoreError,
};

// ── Storage ─────────────────────────────────────────────────────────
pub use crate::cache::SummaryCache;
pub use crate::clock::{Clock, SystemClock};
pub use crate::store::{FileStore, KeyValueStore, KeyValueStoreExt, MemoryStore};

// ── Settings ────────────────────────────────────────────────────────
pub use crate::settings::{ApiProvider, CustomPrompt, ProviderSettings, Settings, SettingsStore};

// ── Providers ───────────────────────────────────────────────────────
pub use crate::api::HttpConfig;
pub use crate::provider::{HttpProviderFactory, LlmProvider, ProviderFactory};

// ── Coordination ────────────────────────────────────────────────────
pub use crate::coordinator::{
    BroadcastMessage, Coordinator, QuestionRequest, SummarizeRequest, TabState, TabStateUpdate,
};
pub use crate::router::{BrowserHost, HostEvent, HostFuture, Request, Response, Router};
