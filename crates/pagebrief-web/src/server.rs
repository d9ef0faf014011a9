//! Axum server setup and router construction.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use pagebrief::router::Router as MessageRouter;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::api::{self, AppState};
use crate::host::WebHost;
use crate::ws::{self, WsState};

/// Build the full axum router.
///
/// The router serves:
/// - WebSocket at `/ws`
/// - REST API at `/api/*`
pub fn build_router(router: Arc<MessageRouter>, host: Arc<WebHost>) -> axum::Router {
    let app_state = AppState {
        router: router.clone(),
        host: host.clone(),
    };
    let ws_state = WsState { router, host };

    // Extension pages and local tools run on other origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let ws_routes = axum::Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .with_state(ws_state);

    let api_routes = axum::Router::new()
        .route("/api/message", post(api::post_message))
        .route("/api/event", post(api::post_event))
        .route("/api/host", post(api::post_host))
        .with_state(app_state);

    axum::Router::new()
        .merge(ws_routes)
        .merge(api_routes)
        .layer(cors)
}

/// Bind and serve on a background task. Returns the bound address.
pub async fn start_server(app: axum::Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("Web server stopped: {e}");
        }
    });

    Ok(addr)
}
