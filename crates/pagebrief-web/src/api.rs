//! REST endpoint handlers.
//!
//! `/api/message` carries the router's request/response contract. The
//! other two endpoints let the companion client feed browser facts in.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use pagebrief::router::{HostEvent, Response, Router};
use pagebrief::{PageSnapshot, TabId};
use serde::Deserialize;
use tracing::debug;

use crate::host::WebHost;

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub host: Arc<WebHost>,
}

/// Request body for POST /api/message.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    /// Any router request, tagged on `action`.
    pub request: serde_json::Value,
    /// Tab of the content script that sent the request.
    #[serde(default)]
    pub sender_tab_id: Option<TabId>,
}

/// POST /api/message: Dispatch one request through the router.
///
/// Always 200; failures are `{ "error": ... }` bodies, as in the extension.
pub async fn post_message(
    State(app): State<AppState>,
    Json(body): Json<MessageEnvelope>,
) -> Json<Response> {
    Json(app.router.handle_value(body.request, body.sender_tab_id).await)
}

/// POST /api/event: Browser lifecycle notification. Returns 204.
pub async fn post_event(State(app): State<AppState>, Json(event): Json<HostEvent>) -> StatusCode {
    debug!("Host event: {event:?}");
    if let HostEvent::TabClosed { tab_id } = event {
        app.host.forget_tab(tab_id);
    }
    app.router.handle_event(event);
    StatusCode::NO_CONTENT
}

/// Request body for POST /api/host.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HostReport {
    /// New focused tab. `null` or absent leaves it unchanged.
    #[serde(default)]
    pub active_tab_id: Option<TabId>,
    /// Tab the `page` snapshot belongs to; defaults to `activeTabId`.
    #[serde(default)]
    pub tab_id: Option<TabId>,
    #[serde(default)]
    pub page: Option<PageSnapshot>,
}

/// POST /api/host: Report the focused tab and/or a page snapshot.
///
/// Returns 204, or 400 when a page is reported without any tab id.
pub async fn post_host(State(app): State<AppState>, Json(report): Json<HostReport>) -> StatusCode {
    if let Some(tab) = report.active_tab_id {
        app.host.set_active_tab(Some(tab));
    }
    if let Some(page) = report.page {
        let Some(tab) = report.tab_id.or(report.active_tab_id) else {
            return StatusCode::BAD_REQUEST;
        };
        app.host.report_page(tab, page);
    }
    StatusCode::NO_CONTENT
}
