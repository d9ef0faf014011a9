//! Serve the pagebrief message router over HTTP and WebSocket.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p pagebrief-web
//! cargo run -p pagebrief-web -- --port 8080 --store /tmp/pagebrief.json
//! ```
//!
//! ## Sending messages
//!
//! **REST** (`POST /api/message`):
//! ```json
//! {"request": {"action": "summarize", "content": "...", "url": "https://example.com"}, "senderTabId": 7}
//! ```
//!
//! **WebSocket** (`/ws?tab=7`) receives
//! `{"action": "summarizationStateUpdated", "tabId": 7, "state": {...}}`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pagebrief::prelude::*;
use pagebrief_web::{HostPushes, WebConfig, WebHost, spawn_web};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Page summarization server.
#[derive(Parser)]
#[command(about = "HTTP and WebSocket front end for pagebrief")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// JSON store holding settings and cached summaries.
    #[arg(long, env = "PAGEBRIEF_STORE")]
    store: Option<PathBuf>,

    /// Seconds before an LLM request is abandoned.
    #[arg(long, default_value_t = 120)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let path = args.store.unwrap_or_else(|| {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pagebrief")
            .join("store.json")
    });
    let store: Arc<dyn KeyValueStore> =
        Arc::new(FileStore::open(&path).map_err(|e| e.to_string())?);

    let http = HttpConfig::default().with_timeout(Duration::from_secs(args.timeout));
    let coordinator = Arc::new(Coordinator::new(
        store,
        Arc::new(SystemClock),
        Arc::new(HttpProviderFactory::new(http)),
    ));
    coordinator.sweep_cache();

    let config = WebConfig {
        bind_addr: ([127, 0, 0, 1], args.port).into(),
        ..Default::default()
    };
    let host = Arc::new(WebHost::new(HostPushes::new(config.broadcast_capacity)));
    let router = Arc::new(Router::new(coordinator, host.clone()));

    let addr = spawn_web(router, host, config)
        .await
        .map_err(|e| format!("failed to bind: {e}"))?;
    println!("pagebrief-web listening on http://{addr} (store: {})", path.display());

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to wait for Ctrl-C: {e}"))?;
    Ok(())
}
