//! Background coordination core for a page-summarization browser extension.
//!
//! `pagebrief` owns everything between "a UI surface asked for a summary"
//! and "every UI surface for that tab shows the result": per-tab request
//! state, prompt resolution, chunked summarization across two LLM vendors,
//! and a TTL cache of finished summaries. Page scraping, rendering and the
//! settings forms are host collaborators; the core only defines the
//! messages and the stored-settings shape they rely on.
//!
//! # Getting started
//!
//! ```ignore
//! use pagebrief::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), CoreError> {
//!     let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open("store.json")?);
//!     let coordinator = Arc::new(Coordinator::new(
//!         store,
//!         Arc::new(SystemClock),
//!         Arc::new(HttpProviderFactory::new(HttpConfig::default())),
//!     ));
//!     let router = Router::new(coordinator, Arc::new(my_host));
//!
//!     let response = router
//!         .handle(Request::GetSummarizationState { tab_id: Some(7) }, None)
//!         .await;
//!     println!("{}", serde_json::to_string(&response).unwrap());
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Splitting long pages:** [`chunker::split`] and
//!   [`chunker::estimate_tokens`].
//! - **Cached summaries:** [`SummaryCache`](cache::SummaryCache), keyed by
//!   URL hash and prompt id with a 24 hour TTL.
//! - **Saved prompts and provider keys:** [`SettingsStore`](settings::SettingsStore).
//! - **Which template applies:** [`prompt::resolve`].
//! - **Talking to OpenAI / Anthropic:** the [`api`] module for the wire
//!   clients, [`provider`] for the chunk-then-synthesize adapter.
//! - **Per-tab state and broadcasts:** [`Coordinator`](coordinator::Coordinator).
//! - **The message contract:** [`Router`](router::Router) and
//!   [`Request`](router::Request).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`store`] | [`KeyValueStore`](store::KeyValueStore) with memory and JSON-file backends |
//! | [`clock`] | Injectable wall clock |
//! | [`chunker`] | Paragraph/sentence-aware token-bounded splitting |
//! | [`cache`] | TTL summary cache |
//! | [`settings`] | Settings groups and saved-prompt management |
//! | [`prompt`] | Built-in templates, rendering, resolution |
//! | [`api`] | OpenAI and Anthropic HTTP clients, context-window policy |
//! | [`provider`] | Summarize / answer-question adapter over any backend |
//! | [`coordinator`] | Per-tab state machine and broadcast fan-out |
//! | [`router`] | Typed request dispatch and tab resolution |
//! | [`error`] | Error taxonomy |

pub mod api;
pub mod cache;
pub mod chunker;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod prelude;
pub mod prompt;
pub mod provider;
pub mod router;
pub mod settings;
pub mod store;

#[cfg(test)]
mod testing;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Browser tab identifier.
pub type TabId = i64;

/// Prompt id used when a request carries none, and the id of the built-in
/// saved prompt.
pub const DEFAULT_PROMPT_ID: &str = "default";

/// The extracted page a summary corresponds to.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContent {
    pub content: String,
    pub url: String,
    pub title: String,
}

/// What the host's page scraper returns for `getContent`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSnapshot {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub description: String,
}

impl From<PageSnapshot> for PageContent {
    fn from(s: PageSnapshot) -> Self {
        Self {
            content: s.content,
            url: s.url,
            title: s.title,
        }
    }
}

/// Generate a unique, roughly time-ordered id such as `prompt-18c2f…-0003`.
pub fn generate_id(prefix: &str) -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{ts:x}-{count:04x}")
}
