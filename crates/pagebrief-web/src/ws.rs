//! WebSocket upgrade handler and push forwarding.
//!
//! `GET /ws` receives every tab's state updates (popup, full-page views).
//! `GET /ws?tab=<id>` receives only that tab's updates, starting with its
//! current state (content-script channel). Both also receive host
//! navigation pushes.
//!
//! Clients may send host events (`navigationStarted`, `tabClosed`) back
//! over the socket; anything else is ignored.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt, stream::SplitSink};
use pagebrief::TabId;
use pagebrief::coordinator::BroadcastMessage;
use pagebrief::router::{HostEvent, Router};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::broadcast::WsMessage;
use crate::host::WebHost;

/// Shared state for WebSocket handlers.
#[derive(Clone)]
pub struct WsState {
    pub router: Arc<Router>,
    pub host: Arc<WebHost>,
}

#[derive(Deserialize)]
pub struct WsQuery {
    pub tab: Option<TabId>,
}

/// GET /ws: WebSocket upgrade handler.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(ws_state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, query.tab, ws_state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, tab: Option<TabId>, ws_state: WsState) {
    let (mut sink, mut stream) = socket.split();
    let coordinator = ws_state.router.coordinator().clone();

    // Subscribe before reading the current state so no update falls between.
    let mut state_rx = match tab {
        Some(tab_id) => coordinator.subscribe_tab(tab_id),
        None => coordinator.subscribe(),
    };
    let mut push_rx = ws_state.host.pushes().subscribe();

    if let Some(tab_id) = tab {
        let initial = WsMessage::SummarizationStateUpdated {
            tab_id,
            state: coordinator.get_state(tab_id),
        };
        if ws_send(&mut sink, &initial).await.is_err() {
            return;
        }
    }

    debug!("WebSocket client connected (tab {tab:?})");

    let forward_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                update = state_rx.recv() => match update {
                    Ok(update) => WsMessage::from(update),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged by {n} state updates");
                        match tab {
                            // Resynchronize the tab channel with its current state.
                            Some(tab_id) => WsMessage::from(BroadcastMessage::SummarizationStateUpdated {
                                tab_id,
                                state: coordinator.get_state(tab_id),
                            }),
                            None => continue,
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                push = push_rx.recv() => match push {
                    Ok(push) => push,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if ws_send(&mut sink, &msg).await.is_err() {
                break; // Client disconnected.
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<HostEvent>(&text) {
                Ok(event) => {
                    if let HostEvent::TabClosed { tab_id } = event {
                        ws_state.host.forget_tab(tab_id);
                    }
                    ws_state.router.handle_event(event);
                }
                Err(_) => debug!("Ignoring unrecognized WebSocket message"),
            },
            Message::Close(_) => break,
            _ => {} // Ignore binary, ping, pong.
        }
    }

    debug!("WebSocket client disconnected");
    forward_task.abort();
}

/// Serialize a `WsMessage` and send it over the WebSocket sink.
async fn ws_send(sink: &mut SplitSink<WebSocket, Message>, msg: &WsMessage) -> Result<(), ()> {
    let json = serde_json::to_string(msg).unwrap_or_default();
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}
