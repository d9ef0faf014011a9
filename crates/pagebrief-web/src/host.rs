//! [`BrowserHost`] backed by what clients report over HTTP.
//!
//! A companion client (extension shim, test harness, curl) reports the
//! focused tab and scraped page snapshots via `POST /api/host`. Requests
//! to open pages are pushed to WebSocket clients.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use pagebrief::error::ExtractionError;
use pagebrief::router::{BrowserHost, HostFuture};
use pagebrief::{PageSnapshot, TabId};
use tracing::debug;

use crate::broadcast::{HostPushes, WsMessage};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct WebHost {
    active_tab: Mutex<Option<TabId>>,
    pages: Mutex<HashMap<TabId, PageSnapshot>>,
    pushes: HostPushes,
}

impl WebHost {
    pub fn new(pushes: HostPushes) -> Self {
        Self {
            active_tab: Mutex::new(None),
            pages: Mutex::new(HashMap::new()),
            pushes,
        }
    }

    pub fn pushes(&self) -> &HostPushes {
        &self.pushes
    }

    pub fn set_active_tab(&self, tab_id: Option<TabId>) {
        *lock(&self.active_tab) = tab_id;
    }

    /// Record the latest snapshot for a tab, replacing any earlier one.
    pub fn report_page(&self, tab_id: TabId, page: PageSnapshot) {
        debug!("Tab {tab_id} reported {} chars from {}", page.content.len(), page.url);
        lock(&self.pages).insert(tab_id, page);
    }

    /// Drop whatever is known about a closed tab.
    pub fn forget_tab(&self, tab_id: TabId) {
        lock(&self.pages).remove(&tab_id);
        let mut active = lock(&self.active_tab);
        if *active == Some(tab_id) {
            *active = None;
        }
    }
}

impl BrowserHost for WebHost {
    fn active_tab(&self) -> HostFuture<'_, Option<TabId>> {
        let tab = *lock(&self.active_tab);
        Box::pin(async move { tab })
    }

    fn extract_page(&self, tab_id: TabId) -> HostFuture<'_, Result<PageSnapshot, ExtractionError>> {
        let page = lock(&self.pages).get(&tab_id).cloned();
        Box::pin(async move {
            page.ok_or_else(|| ExtractionError::Failed {
                tab_id,
                message: "no page content reported for this tab".into(),
            })
        })
    }

    fn open_options_page(&self) -> HostFuture<'_, ()> {
        self.pushes.broadcast(WsMessage::OpenOptionsPage);
        Box::pin(async {})
    }

    fn open_full_page<'a>(&'a self, session_id: &'a str) -> HostFuture<'a, ()> {
        self.pushes.broadcast(WsMessage::OpenFullPage {
            session_id: session_id.to_string(),
        });
        Box::pin(async {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str) -> PageSnapshot {
        PageSnapshot {
            title: "T".into(),
            url: url.into(),
            content: "body".into(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn reported_pages_are_extracted() {
        let host = WebHost::new(HostPushes::new(4));
        host.report_page(1, page("https://a.test"));
        assert_eq!(host.extract_page(1).await.unwrap().url, "https://a.test");
        assert!(matches!(
            host.extract_page(2).await,
            Err(ExtractionError::Failed { tab_id: 2, .. })
        ));
    }

    #[tokio::test]
    async fn forgetting_active_tab_clears_it() {
        let host = WebHost::new(HostPushes::new(4));
        host.set_active_tab(Some(5));
        host.report_page(5, page("https://a.test"));
        host.forget_tab(5);
        assert_eq!(host.active_tab().await, None);
        assert!(host.extract_page(5).await.is_err());
    }

    #[tokio::test]
    async fn full_page_is_pushed() {
        let host = WebHost::new(HostPushes::new(4));
        let mut rx = host.pushes().subscribe();
        host.open_full_page("fp-9").await;
        assert_eq!(
            rx.recv().await.unwrap(),
            WsMessage::OpenFullPage {
                session_id: "fp-9".into()
            }
        );
    }
}
