//! Server-to-client push messages.
//!
//! State updates come from the coordinator's broadcast channels. Navigation
//! pushes (`openOptionsPage`, `openFullPage`) come from the [`WebHost`]
//! through [`HostPushes`], since a web transport has no browser to drive
//! directly and asks its clients to navigate instead.
//!
//! [`WebHost`]: crate::host::WebHost

use pagebrief::TabId;
use pagebrief::coordinator::{BroadcastMessage, TabState};
use serde::Serialize;
use tokio::sync::broadcast;

/// A message sent from the server to WebSocket clients.
///
/// Discriminated on the `action` field, matching the extension's runtime
/// messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum WsMessage {
    /// A tab's state changed (also sent once on connect for `/ws?tab=`).
    #[serde(rename_all = "camelCase")]
    SummarizationStateUpdated { tab_id: TabId, state: TabState },
    /// Open the options page.
    OpenOptionsPage,
    /// Open the full-page view for a stored session.
    #[serde(rename_all = "camelCase")]
    OpenFullPage { session_id: String },
}

impl From<BroadcastMessage> for WsMessage {
    fn from(msg: BroadcastMessage) -> Self {
        match msg {
            BroadcastMessage::SummarizationStateUpdated { tab_id, state } => {
                WsMessage::SummarizationStateUpdated { tab_id, state }
            }
        }
    }
}

/// Fan-out for host navigation pushes.
#[derive(Clone)]
pub struct HostPushes {
    sender: broadcast::Sender<WsMessage>,
}

impl HostPushes {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }

    /// Send to every connected client. No clients is not an error.
    pub fn broadcast(&self, msg: WsMessage) {
        let _ = self.sender.send(msg);
    }
}
