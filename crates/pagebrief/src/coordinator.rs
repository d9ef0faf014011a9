//! Per-tab summarization state and broadcast fan-out.
//!
//! The [`Coordinator`] owns one [`TabState`] per browser tab and is the only
//! writer of that state. Every change is pushed to two audiences: general
//! subscribers (popup, full-page views) and the tab's own content-script
//! channel. Delivery is best-effort: a channel with no receivers drops the
//! message, and late subscribers never see earlier updates.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──summarize──▶ Loading ──ok──▶ Success ─┐
//!                        │                     ├──next request──▶ Loading
//!                        └──err──▶ Failed ─────┘
//! any ──navigation──▶ Idle
//! ```
//!
//! At most one summarization runs per tab. The loading check and the
//! transition into `Loading` happen under one lock acquisition, so a second
//! request for a busy tab returns the tab's current summary at once and
//! never reaches a provider. Each accepted run holds a generation number;
//! navigation or a close retires it, and the retired run's result is
//! returned to its caller but never written to the tab.
//!
//! Broadcasts are sent while the state lock is held, so subscribers see
//! updates of one tab in the order they were applied.

use crate::cache::SummaryCache;
use crate::clock::Clock;
use crate::error::CoreError;
use crate::prompt::resolve;
use crate::provider::ProviderFactory;
use crate::settings::SettingsStore;
use crate::store::KeyValueStore;
use crate::{PageContent, TabId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Per-channel buffer. Slow receivers skip ahead rather than block senders.
const CHANNEL_CAPACITY: usize = 64;

// ── State types ────────────────────────────────────────────────────

/// One tab's summarization state.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TabState {
    pub is_loading: bool,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub page_content: Option<PageContent>,
}

impl TabState {
    /// Whether any field differs from a fresh tab.
    pub fn is_empty(&self) -> bool {
        *self == TabState::default()
    }
}

/// A partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabStateUpdate {
    pub is_loading: Option<bool>,
    pub summary: Option<Option<String>>,
    pub error: Option<Option<String>>,
    pub page_content: Option<Option<PageContent>>,
}

impl TabStateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loading(mut self, is_loading: bool) -> Self {
        self.is_loading = Some(is_loading);
        self
    }

    pub fn summary(mut self, summary: Option<String>) -> Self {
        self.summary = Some(summary);
        self
    }

    pub fn error(mut self, error: Option<String>) -> Self {
        self.error = Some(error);
        self
    }

    pub fn page_content(mut self, page: Option<PageContent>) -> Self {
        self.page_content = Some(page);
        self
    }

    fn apply(self, state: &mut TabState) {
        if let Some(v) = self.is_loading {
            state.is_loading = v;
        }
        if let Some(v) = self.summary {
            state.summary = v;
        }
        if let Some(v) = self.error {
            state.error = v;
        }
        if let Some(v) = self.page_content {
            state.page_content = v;
        }
    }
}

/// Pushed to subscribers after every state change.
///
/// Serialized as `{"action":"summarizationStateUpdated","tabId":..,"state":{..}}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum BroadcastMessage {
    #[serde(rename_all = "camelCase")]
    SummarizationStateUpdated { tab_id: TabId, state: TabState },
}

impl BroadcastMessage {
    pub fn tab_id(&self) -> TabId {
        match self {
            BroadcastMessage::SummarizationStateUpdated { tab_id, .. } => *tab_id,
        }
    }
}

/// Inputs of one summarization.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeRequest {
    pub content: String,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default)]
    pub prompt_text: Option<String>,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

impl SummarizeRequest {
    fn page(&self) -> PageContent {
        PageContent {
            content: self.content.clone(),
            url: self.url.clone(),
            title: self.title.clone(),
        }
    }
}

/// Inputs of one follow-up question.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    pub question: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub summary: String,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Broadcaster ────────────────────────────────────────────────────

/// General channel plus one lazily created channel per tab.
pub struct Broadcaster {
    general: broadcast::Sender<BroadcastMessage>,
    tabs: Mutex<HashMap<TabId, broadcast::Sender<BroadcastMessage>>>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        let (general, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            general,
            tabs: Mutex::new(HashMap::new()),
        }
    }
}

impl Broadcaster {
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.general.subscribe()
    }

    pub fn subscribe_tab(&self, tab_id: TabId) -> broadcast::Receiver<BroadcastMessage> {
        lock(&self.tabs)
            .entry(tab_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver to everyone listening. Missing receivers are not an error.
    pub fn send(&self, msg: BroadcastMessage) {
        if let Some(tab) = lock(&self.tabs).get(&msg.tab_id()) {
            let _ = tab.send(msg.clone());
        }
        let _ = self.general.send(msg);
    }

    fn remove_tab(&self, tab_id: TabId) {
        lock(&self.tabs).remove(&tab_id);
    }
}

// ── Coordinator ────────────────────────────────────────────────────

#[derive(Default)]
struct TabEntry {
    state: TabState,
    /// Run allowed to write the end of the current lifecycle.
    generation: u64,
}

pub struct Coordinator {
    tabs: Mutex<HashMap<TabId, TabEntry>>,
    generations: AtomicU64,
    broadcaster: Broadcaster,
    settings: SettingsStore,
    cache: Arc<SummaryCache>,
    providers: Arc<dyn ProviderFactory>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        let cache = Arc::new(SummaryCache::new(store.clone(), clock.clone()));
        Self {
            tabs: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
            broadcaster: Broadcaster::default(),
            settings: SettingsStore::new(store.clone(), cache.clone()),
            cache,
            providers,
            store,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn cache(&self) -> &SummaryCache {
        &self.cache
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.broadcaster.subscribe()
    }

    pub fn subscribe_tab(&self, tab_id: TabId) -> broadcast::Receiver<BroadcastMessage> {
        self.broadcaster.subscribe_tab(tab_id)
    }

    /// Drop expired cache entries. Call once at startup.
    pub fn sweep_cache(&self) {
        match self.cache.clean_expired() {
            Ok(n) => debug!("Startup cache sweep removed {n} entries"),
            Err(e) => warn!("Startup cache sweep failed: {e}"),
        }
    }

    // ── State access ───────────────────────────────────────────────

    /// Current state of `tab_id`, created empty on first reference.
    pub fn get_state(&self, tab_id: TabId) -> TabState {
        lock(&self.tabs).entry(tab_id).or_default().state.clone()
    }

    /// Merge `update` into the tab's state and broadcast the result.
    pub fn update_state(&self, tab_id: TabId, update: TabStateUpdate) -> TabState {
        let mut tabs = lock(&self.tabs);
        let entry = tabs.entry(tab_id).or_default();
        update.apply(&mut entry.state);
        self.publish(tab_id, &entry.state);
        entry.state.clone()
    }

    /// Clear the tab when it starts loading a new page. A summarization
    /// still running for the old page no longer owns the tab.
    pub fn reset_on_navigation(&self, tab_id: TabId) {
        let mut tabs = lock(&self.tabs);
        let entry = tabs.entry(tab_id).or_default();
        entry.generation = self.next_generation();
        if entry.state.is_empty() {
            return;
        }
        entry.state = TabState::default();
        debug!("Tab {tab_id} navigated; state reset");
        self.publish(tab_id, &entry.state);
    }

    /// Forget a closed tab.
    pub fn forget_tab(&self, tab_id: TabId) {
        lock(&self.tabs).remove(&tab_id);
        self.broadcaster.remove_tab(tab_id);
        debug!("Tab {tab_id} closed; state dropped");
    }

    /// Number of tabs with state.
    pub fn tab_count(&self) -> usize {
        lock(&self.tabs).len()
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Must be called with the `tabs` lock held.
    fn publish(&self, tab_id: TabId, state: &TabState) {
        self.broadcaster.send(BroadcastMessage::SummarizationStateUpdated {
            tab_id,
            state: state.clone(),
        });
    }

    /// Enter `Loading` unless already there, returning the run's
    /// generation. On refusal, returns the summary the tab currently shows.
    fn try_begin(&self, tab_id: TabId, page: PageContent) -> Result<u64, Option<String>> {
        let mut tabs = lock(&self.tabs);
        let entry = tabs.entry(tab_id).or_default();
        if entry.state.is_loading {
            return Err(entry.state.summary.clone());
        }
        entry.generation = self.next_generation();
        entry.state.is_loading = true;
        entry.state.error = None;
        entry.state.page_content = Some(page);
        self.publish(tab_id, &entry.state);
        Ok(entry.generation)
    }

    /// Apply the final update of run `generation`. Dropped when the tab
    /// has navigated or closed since the run began.
    fn finish(&self, tab_id: TabId, generation: u64, update: TabStateUpdate) {
        let mut tabs = lock(&self.tabs);
        match tabs.get_mut(&tab_id) {
            Some(entry) if entry.generation == generation => {
                update.apply(&mut entry.state);
                self.publish(tab_id, &entry.state);
            }
            _ => debug!("Tab {tab_id} moved on; dropping stale summarization result"),
        }
    }

    // ── Lifecycles ─────────────────────────────────────────────────

    /// Summarize a page for `tab_id`.
    ///
    /// Returns `Ok(None)` only when another summarization for the tab is
    /// in flight and no earlier summary exists. Failures are recorded in
    /// the tab's `error` field before being returned.
    pub async fn summarize(
        &self,
        tab_id: TabId,
        request: SummarizeRequest,
    ) -> Result<Option<String>, CoreError> {
        let generation = match self.try_begin(tab_id, request.page()) {
            Ok(generation) => generation,
            Err(current) => {
                info!("Tab {tab_id} already summarizing; returning current summary");
                return Ok(current);
            }
        };

        let start = Instant::now();
        match self.run_summarize(&request).await {
            Ok(summary) => {
                info!(
                    "Tab {tab_id} summarized in {:.1}s ({} chars)",
                    start.elapsed().as_secs_f64(),
                    summary.len()
                );
                self.finish(
                    tab_id,
                    generation,
                    TabStateUpdate::new()
                        .loading(false)
                        .summary(Some(summary.clone())),
                );
                Ok(Some(summary))
            }
            Err(e) => {
                warn!("Tab {tab_id} summarization failed: {e}");
                self.finish(
                    tab_id,
                    generation,
                    TabStateUpdate::new()
                        .loading(false)
                        .error(Some(e.to_string())),
                );
                Err(e)
            }
        }
    }

    async fn run_summarize(&self, request: &SummarizeRequest) -> Result<String, CoreError> {
        let settings = self.settings.load()?;
        let resolved = resolve(
            request.prompt_text.as_deref(),
            request.prompt_id.as_deref(),
            &settings.prompts,
        );
        let cache_id = resolved.prompt_id.as_deref();

        if !request.force_refresh {
            match self.cache.get(&request.url, cache_id) {
                Ok(Some(hit)) => {
                    info!("Serving cached summary for {}", request.url);
                    return Ok(hit);
                }
                Ok(None) => {}
                Err(e) => warn!("Cache read failed for {}, treating as miss: {e}", request.url),
            }
        }

        let provider = self.providers.create(&settings.provider)?;
        let summary = provider
            .summarize(&request.content, resolved.template())
            .await?;

        if let Err(e) = self.cache.set(&request.url, &summary, cache_id) {
            warn!("Failed to cache summary for {}: {e}", request.url);
        }
        Ok(summary)
    }

    /// Answer a follow-up question. Not cached and never marks the tab as
    /// loading; a stale error on the tab is cleared first.
    pub async fn answer_question(
        &self,
        tab_id: Option<TabId>,
        request: QuestionRequest,
    ) -> Result<String, CoreError> {
        if let Some(tab_id) = tab_id
            && self.get_state(tab_id).error.is_some()
        {
            self.update_state(tab_id, TabStateUpdate::new().error(None));
        }

        let settings = self.settings.load()?;
        let provider = self.providers.create(&settings.provider)?;
        let answer = provider
            .answer_question(
                &request.context,
                &request.summary,
                &request.question,
                settings.prompts.question_template(),
            )
            .await?;
        debug!("Answered question ({} chars)", answer.len());
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{ConfigurationError, ProviderError};
    use crate::provider::HttpProviderFactory;
    use crate::settings::{CustomPrompts, ProviderSettings};
    use crate::store::MemoryStore;
    use crate::testing::{MockFactory, MockProvider, BrokenCacheStore};

    fn coordinator(factory: Arc<dyn ProviderFactory>) -> Coordinator {
        Coordinator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            factory,
        )
    }

    fn with_key(c: &Coordinator) {
        c.settings()
            .save_provider(&ProviderSettings {
                openai_api_key: "sk-test".into(),
                ..Default::default()
            })
            .unwrap();
    }

    fn request(url: &str) -> SummarizeRequest {
        SummarizeRequest {
            content: "Page body.".into(),
            url: url.into(),
            title: "Title".into(),
            ..Default::default()
        }
    }

    #[test]
    fn state_is_created_lazily_and_empty() {
        let c = coordinator(Arc::new(HttpProviderFactory::default()));
        assert_eq!(c.tab_count(), 0);
        assert_eq!(c.get_state(3), TabState::default());
        assert_eq!(c.tab_count(), 1);
    }

    #[tokio::test]
    async fn update_merges_and_reaches_both_audiences() {
        let c = coordinator(Arc::new(HttpProviderFactory::default()));
        let mut general = c.subscribe();
        let mut own = c.subscribe_tab(5);
        let mut other = c.subscribe_tab(6);

        c.update_state(5, TabStateUpdate::new().summary(Some("S".into())));
        let state = c.update_state(5, TabStateUpdate::new().loading(true));
        assert_eq!(state.summary.as_deref(), Some("S"));
        assert!(state.is_loading);

        let first = general.recv().await.unwrap();
        assert_eq!(first.tab_id(), 5);
        let last = general.recv().await.unwrap();
        assert_eq!(last, BroadcastMessage::SummarizationStateUpdated { tab_id: 5, state: state.clone() });
        assert_eq!(own.recv().await.unwrap().tab_id(), 5);
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn broadcast_wire_shape() {
        let msg = BroadcastMessage::SummarizationStateUpdated {
            tab_id: 9,
            state: TabState {
                is_loading: true,
                ..Default::default()
            },
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({
                "action": "summarizationStateUpdated",
                "tabId": 9,
                "state": {"isLoading": true, "summary": null, "error": null, "pageContent": null}
            })
        );
    }

    #[test]
    fn updates_without_subscribers_are_fine() {
        let c = coordinator(Arc::new(HttpProviderFactory::default()));
        let s = c.update_state(1, TabStateUpdate::new().error(Some("x".into())));
        assert_eq!(s.error.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn summarize_success_caches_and_records() {
        let factory = Arc::new(MockFactory::new(MockProvider::replying("fresh summary")));
        let c = coordinator(factory.clone());
        with_key(&c);

        let out = c.summarize(1, request("https://a.test")).await.unwrap();
        assert_eq!(out.as_deref(), Some("fresh summary"));
        let state = c.get_state(1);
        assert!(!state.is_loading);
        assert_eq!(state.summary.as_deref(), Some("fresh summary"));
        assert_eq!(state.page_content.unwrap().title, "Title");

        // Same page and prompt on another tab: served from cache.
        let again = c.summarize(2, request("https://a.test")).await.unwrap();
        assert_eq!(again.as_deref(), Some("fresh summary"));
        assert_eq!(factory.provider.summarize_calls.load(Ordering::SeqCst), 1);
        // A cache hit never builds a provider.
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);

        let forced = SummarizeRequest {
            force_refresh: true,
            ..request("https://a.test")
        };
        c.summarize(2, forced).await.unwrap();
        assert_eq!(factory.provider.summarize_calls.load(Ordering::SeqCst), 2);
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn broken_cache_counts_as_a_miss() {
        let factory = Arc::new(MockFactory::new(MockProvider::replying("from provider")));
        let c = Coordinator::new(
            Arc::new(BrokenCacheStore::default()),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            factory.clone(),
        );
        with_key(&c);

        assert!(c.cache().get("https://a.test", Some("default")).is_err());
        let out = c.summarize(1, request("https://a.test")).await.unwrap();
        assert_eq!(out.as_deref(), Some("from provider"));
        assert_eq!(c.get_state(1).error, None);
        assert_eq!(factory.provider.summarize_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn broadcasts_arrive_in_the_order_updates_were_applied() {
        let c = Arc::new(coordinator(Arc::new(HttpProviderFactory::default())));
        let mut rx = c.subscribe();

        for round in 0..500 {
            let writers: Vec<_> = ["A", "B"]
                .into_iter()
                .map(|summary| {
                    let c = c.clone();
                    std::thread::spawn(move || {
                        c.update_state(1, TabStateUpdate::new().summary(Some(summary.into())));
                    })
                })
                .collect();
            for writer in writers {
                writer.join().unwrap();
            }

            let mut last = None;
            while let Ok(msg) = rx.try_recv() {
                last = Some(msg);
            }
            let Some(BroadcastMessage::SummarizationStateUpdated { state, .. }) = last else {
                panic!("round {round}: nothing broadcast");
            };
            assert_eq!(state, c.get_state(1), "round {round}");
        }
    }

    #[tokio::test]
    async fn concurrent_request_gets_current_summary() {
        let factory = Arc::new(MockFactory::new(MockProvider::replying("new").gated()));
        let c = Arc::new(coordinator(factory.clone()));
        with_key(&c);
        c.update_state(7, TabStateUpdate::new().summary(Some("previous".into())));

        let first = tokio::spawn({
            let c = c.clone();
            async move { c.summarize(7, request("https://a.test")).await }
        });
        while factory.provider.summarize_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(c.get_state(7).is_loading);

        let second = c.summarize(7, request("https://a.test")).await.unwrap();
        assert_eq!(second.as_deref(), Some("previous"));
        assert_eq!(factory.provider.summarize_calls.load(Ordering::SeqCst), 1);

        factory.provider.release();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.as_deref(), Some("new"));
        assert!(!c.get_state(7).is_loading);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn navigation_retires_the_running_summarization() {
        let factory = Arc::new(MockFactory::new(MockProvider::replying("done").gated()));
        let c = Arc::new(coordinator(factory.clone()));
        with_key(&c);
        let calls = || factory.provider.summarize_calls.load(Ordering::SeqCst);

        let old_page = tokio::spawn({
            let c = c.clone();
            async move { c.summarize(1, request("https://old.test")).await }
        });
        while calls() == 0 {
            tokio::task::yield_now().await;
        }

        c.reset_on_navigation(1);
        assert_eq!(c.get_state(1), TabState::default());
        let mut rx = c.subscribe_tab(1);

        let new_page = tokio::spawn({
            let c = c.clone();
            async move { c.summarize(1, request("https://new.test")).await }
        });
        while calls() == 1 {
            tokio::task::yield_now().await;
        }

        // The new page's run owns the tab; further requests wait on it.
        let refused = c.summarize(1, request("https://new.test")).await.unwrap();
        assert_eq!(refused, None);
        assert_eq!(calls(), 2);

        factory.provider.release();
        assert_eq!(old_page.await.unwrap().unwrap().as_deref(), Some("done"));
        assert_eq!(new_page.await.unwrap().unwrap().as_deref(), Some("done"));

        // Only the new run's start and finish reached the tab.
        let mut seen = Vec::new();
        while let Ok(BroadcastMessage::SummarizationStateUpdated { state, .. }) = rx.try_recv() {
            seen.push(state);
        }
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_loading);
        assert!(!seen[1].is_loading);
        assert_eq!(seen[1].page_content.as_ref().unwrap().url, "https://new.test");
        assert_eq!(c.get_state(1), seen[1]);
    }

    #[tokio::test]
    async fn closed_tab_is_not_recreated_by_its_summarization() {
        let factory = Arc::new(MockFactory::new(MockProvider::replying("late").gated()));
        let c = Arc::new(coordinator(factory.clone()));
        with_key(&c);

        let run = tokio::spawn({
            let c = c.clone();
            async move { c.summarize(3, request("https://a.test")).await }
        });
        while factory.provider.summarize_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        c.forget_tab(3);
        factory.provider.release();

        assert_eq!(run.await.unwrap().unwrap().as_deref(), Some("late"));
        assert_eq!(c.tab_count(), 0);
    }

    #[tokio::test]
    async fn missing_key_sets_error_without_network() {
        let c = coordinator(Arc::new(HttpProviderFactory::default()));
        let err = c.summarize(4, request("https://a.test")).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Configuration(ConfigurationError::MissingApiKey { .. })
        ));

        let state = c.get_state(4);
        assert!(!state.is_loading);
        assert!(state.error.unwrap().contains("No API key configured for OpenAI"));
    }

    #[tokio::test]
    async fn provider_failure_is_recorded_then_cleared_on_retry() {
        let failing = MockProvider::failing(ProviderError::Status {
            provider: "OpenAI",
            status: 503,
            body: "unavailable".into(),
        });
        let c = coordinator(Arc::new(MockFactory::new(failing)));
        with_key(&c);

        assert!(c.summarize(1, request("https://a.test")).await.is_err());
        assert!(c.get_state(1).error.unwrap().contains("HTTP 503"));

        let mut rx = c.subscribe_tab(1);
        let _ = c.summarize(1, request("https://a.test")).await;
        let loading = rx.recv().await.unwrap();
        let BroadcastMessage::SummarizationStateUpdated { state, .. } = loading;
        assert!(state.is_loading);
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn explicit_prompt_text_is_cached_under_its_own_id() {
        let factory = Arc::new(MockFactory::new(MockProvider::replying("")));
        let c = coordinator(factory.clone());
        with_key(&c);
        c.cache().set("https://a.test", "from saved default", Some("default")).unwrap();

        let out = c.summarize(1, request("https://a.test")).await.unwrap();
        assert_eq!(out.as_deref(), Some("from saved default"));

        let custom = SummarizeRequest {
            prompt_id: Some("adhoc".into()),
            prompt_text: Some("Haiku: {content}".into()),
            ..request("https://a.test")
        };
        let out = c.summarize(1, custom).await.unwrap();
        assert_eq!(out.as_deref(), Some("Page body."));
        assert_eq!(factory.provider.summarize_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn navigation_resets_populated_tab() {
        let c = coordinator(Arc::new(HttpProviderFactory::default()));
        c.update_state(2, TabStateUpdate::new().summary(Some("S".into())));
        let mut rx = c.subscribe();

        c.reset_on_navigation(2);
        assert_eq!(c.get_state(2), TabState::default());
        assert!(rx.try_recv().is_ok());

        // Already empty: nothing to broadcast.
        c.reset_on_navigation(2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn forget_tab_drops_state() {
        let c = coordinator(Arc::new(HttpProviderFactory::default()));
        c.update_state(8, TabStateUpdate::new().summary(Some("S".into())));
        c.forget_tab(8);
        assert_eq!(c.tab_count(), 0);
        assert_eq!(c.get_state(8), TabState::default());
    }

    #[tokio::test]
    async fn question_clears_error_and_uses_custom_template() {
        let factory = Arc::new(MockFactory::new(MockProvider::replying("answer")));
        let c = coordinator(factory.clone());
        with_key(&c);
        let mut prompts = c.settings().load().unwrap().prompts;
        prompts.custom_prompts = CustomPrompts {
            summarize: String::new(),
            question: "Q={question}".into(),
        };
        c.settings().save_prompts(&prompts).unwrap();
        c.update_state(3, TabStateUpdate::new().error(Some("old".into())));

        let req = QuestionRequest {
            question: "why?".into(),
            context: "ctx".into(),
            summary: "sum".into(),
        };
        let answer = c.answer_question(Some(3), req).await.unwrap();
        assert_eq!(answer, "answer [why?] [Q={question}]");
        assert_eq!(c.get_state(3).error, None);
        assert!(!c.get_state(3).is_loading);
        assert_eq!(factory.provider.question_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn question_failure_is_not_recorded() {
        let c = coordinator(Arc::new(HttpProviderFactory::default()));
        let err = c
            .answer_question(Some(1), QuestionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
        assert_eq!(c.get_state(1).error, None);
    }
}
