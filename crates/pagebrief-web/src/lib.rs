//! HTTP and WebSocket transport for the pagebrief message router.
//!
//! `pagebrief-web` lets clients outside the browser (a companion extension
//! shim, scripts, tests) speak the same message contract the extension's
//! UI surfaces use, and watch state broadcasts live.
//!
//! # Quick start
//!
//! ```ignore
//! use pagebrief::prelude::*;
//! use pagebrief_web::{HostPushes, WebConfig, WebHost, spawn_web};
//! use std::sync::Arc;
//!
//! let config = WebConfig::default();
//! let host = Arc::new(WebHost::new(HostPushes::new(config.broadcast_capacity)));
//! let router = Arc::new(Router::new(coordinator, host.clone()));
//! let addr = spawn_web(router, host, config).await?;
//! println!("Listening on http://{addr}");
//! ```
//!
//! # Architecture
//!
//! ```text
//! POST /api/message ──Request──▶ Router ──▶ Coordinator ──BroadcastMessage──▶ /ws clients
//! POST /api/event   ──HostEvent──▶ Router                                      ▲
//! POST /api/host    ──active tab, page snapshots──▶ WebHost ──WsMessage────────┘
//! ```

mod api;
pub mod broadcast;
pub mod host;
mod server;
mod ws;

pub use broadcast::{HostPushes, WsMessage};
pub use host::WebHost;

use std::net::SocketAddr;
use std::sync::Arc;

use pagebrief::router::Router;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
    /// Capacity of the host push channel. Default: 256.
    pub broadcast_capacity: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            broadcast_capacity: 256,
        }
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// `host` must be the same instance the `router` was built with, so that
/// page reports and navigation pushes reach the router's requests.
///
/// The server runs until the Tokio runtime shuts down.
pub async fn spawn_web(
    router: Arc<Router>,
    host: Arc<WebHost>,
    config: WebConfig,
) -> std::io::Result<SocketAddr> {
    let app = server::build_router(router, host);
    server::start_server(app, config.bind_addr).await
}
