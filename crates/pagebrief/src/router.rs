//! Typed request dispatch.
//!
//! UI surfaces talk to the core with [`Request`] messages tagged on
//! `action`. The [`Router`] resolves which tab a request is about, hands it
//! to the [`Coordinator`] or the [`BrowserHost`], and flattens every failure
//! into `{ "error": "<message>" }`.

use crate::coordinator::{Coordinator, QuestionRequest, SummarizeRequest, TabState};
use crate::error::{CoreError, ExtractionError};
use crate::store::KeyValueStoreExt;
use crate::{PageContent, PageSnapshot, TabId, generate_id};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Storage key prefix for full-page sessions.
pub const FULL_PAGE_PREFIX: &str = "fullpage_";

/// Boxed future returned by [`BrowserHost`] methods.
pub type HostFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ── Messages ───────────────────────────────────────────────────────

/// A message from a UI surface.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    Summarize {
        content: String,
        url: String,
        #[serde(default)]
        title: String,
        #[serde(default)]
        force_refresh: bool,
        #[serde(default)]
        prompt_text: Option<String>,
        #[serde(default)]
        prompt_id: Option<String>,
        #[serde(default)]
        tab_id: Option<TabId>,
    },
    #[serde(rename_all = "camelCase")]
    Question {
        question: String,
        #[serde(default)]
        context: String,
        #[serde(default)]
        summary: String,
        #[serde(default)]
        tab_id: Option<TabId>,
    },
    #[serde(rename_all = "camelCase")]
    GetContent {
        #[serde(default)]
        tab_id: Option<TabId>,
    },
    #[serde(rename_all = "camelCase")]
    GetSummarizationState {
        #[serde(default)]
        tab_id: Option<TabId>,
    },
    OpenOptionsPage,
    #[serde(rename_all = "camelCase")]
    OpenFullPage {
        #[serde(default)]
        summary: Option<String>,
        #[serde(default)]
        page_content: Option<PageContent>,
    },
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::Summarize { .. } => "summarize",
            Request::Question { .. } => "question",
            Request::GetContent { .. } => "getContent",
            Request::GetSummarizationState { .. } => "getSummarizationState",
            Request::OpenOptionsPage => "openOptionsPage",
            Request::OpenFullPage { .. } => "openFullPage",
        }
    }
}

/// The reply to a [`Request`]. Serialized without a tag; the shape depends
/// on the request.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Response {
    /// `summary` is `null` when the tab is already summarizing and has no
    /// earlier result.
    Summary { summary: Option<String> },
    Answer { answer: String },
    Content(PageSnapshot),
    State(TabState),
    Success {
        success: bool,
        #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    Error { error: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

/// Browser lifecycle notifications.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    #[serde(rename_all = "camelCase")]
    NavigationStarted { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    TabClosed { tab_id: TabId },
}

/// What a full-page view loads by session id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FullPageSession {
    pub summary: Option<String>,
    pub page_content: Option<PageContent>,
    pub created_at: i64,
}

// ── Host seam ──────────────────────────────────────────────────────

/// The browser capabilities the core relies on but does not implement.
pub trait BrowserHost: Send + Sync {
    /// The focused tab, if any.
    fn active_tab(&self) -> HostFuture<'_, Option<TabId>>;

    /// Scrape the tab's visible text.
    fn extract_page(&self, tab_id: TabId) -> HostFuture<'_, Result<PageSnapshot, ExtractionError>>;

    fn open_options_page(&self) -> HostFuture<'_, ()>;

    /// Open the full-page view for a stored session.
    fn open_full_page<'a>(&'a self, session_id: &'a str) -> HostFuture<'a, ()>;
}

// ── Router ─────────────────────────────────────────────────────────

pub struct Router {
    coordinator: Arc<Coordinator>,
    host: Arc<dyn BrowserHost>,
}

impl Router {
    pub fn new(coordinator: Arc<Coordinator>, host: Arc<dyn BrowserHost>) -> Self {
        Self { coordinator, host }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Handle one request. `sender_tab` is the tab of the content script
    /// that sent it, when there is one.
    pub async fn handle(&self, request: Request, sender_tab: Option<TabId>) -> Response {
        let action = request.action();
        debug!("Handling '{action}' (sender tab {sender_tab:?})");
        match self.dispatch(request, sender_tab).await {
            Ok(response) => response,
            Err(e) => {
                warn!("'{action}' failed: {e}");
                Response::error(e.to_string())
            }
        }
    }

    /// Like [`handle`](Self::handle) for an untyped message. Unknown or
    /// malformed messages become error responses.
    pub async fn handle_value(&self, message: serde_json::Value, sender_tab: Option<TabId>) -> Response {
        match serde_json::from_value::<Request>(message) {
            Ok(request) => self.handle(request, sender_tab).await,
            Err(e) => Response::error(format!("Invalid request: {e}")),
        }
    }

    /// Apply a browser lifecycle event to the tab states.
    pub fn handle_event(&self, event: HostEvent) {
        match event {
            HostEvent::NavigationStarted { tab_id } => self.coordinator.reset_on_navigation(tab_id),
            HostEvent::TabClosed { tab_id } => self.coordinator.forget_tab(tab_id),
        }
    }

    /// Explicit tab, then the sender's tab, then the host's active tab.
    pub async fn resolve_tab(
        &self,
        explicit: Option<TabId>,
        sender_tab: Option<TabId>,
    ) -> Result<TabId, ExtractionError> {
        if let Some(tab) = explicit.or(sender_tab) {
            return Ok(tab);
        }
        self.host.active_tab().await.ok_or(ExtractionError::NoActiveTab)
    }

    async fn dispatch(&self, request: Request, sender_tab: Option<TabId>) -> Result<Response, CoreError> {
        match request {
            Request::Summarize {
                content,
                url,
                title,
                force_refresh,
                prompt_text,
                prompt_id,
                tab_id,
            } => {
                let tab = self.resolve_tab(tab_id, sender_tab).await?;
                let summary = self
                    .coordinator
                    .summarize(
                        tab,
                        SummarizeRequest {
                            content,
                            url,
                            title,
                            force_refresh,
                            prompt_text,
                            prompt_id,
                        },
                    )
                    .await?;
                Ok(Response::Summary { summary })
            }

            Request::Question {
                question,
                context,
                summary,
                tab_id,
            } => {
                // The tab only matters for clearing a stale error.
                let tab = self.resolve_tab(tab_id, sender_tab).await.ok();
                let answer = self
                    .coordinator
                    .answer_question(
                        tab,
                        QuestionRequest {
                            question,
                            context,
                            summary,
                        },
                    )
                    .await?;
                Ok(Response::Answer { answer })
            }

            Request::GetContent { tab_id } => {
                let tab = self.resolve_tab(tab_id, sender_tab).await?;
                let page = self.host.extract_page(tab).await?;
                debug!("Extracted {} chars from tab {tab}", page.content.len());
                Ok(Response::Content(page))
            }

            Request::GetSummarizationState { tab_id } => {
                let tab = self.resolve_tab(tab_id, sender_tab).await?;
                Ok(Response::State(self.coordinator.get_state(tab)))
            }

            Request::OpenOptionsPage => {
                self.host.open_options_page().await;
                Ok(Response::Success {
                    success: true,
                    session_id: None,
                })
            }

            Request::OpenFullPage {
                summary,
                page_content,
            } => {
                let session_id = generate_id("fp");
                let session = FullPageSession {
                    summary,
                    page_content,
                    created_at: self.coordinator.clock().now_millis(),
                };
                self.coordinator
                    .store()
                    .set_json(&format!("{FULL_PAGE_PREFIX}{session_id}"), &session)?;
                info!("Opening full page session {session_id}");
                self.host.open_full_page(&session_id).await;
                Ok(Response::Success {
                    success: true,
                    session_id: Some(session_id),
                })
            }
        }
    }
}
