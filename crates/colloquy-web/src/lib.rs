//! HTTP surface for colloquy conversations.
//!
//! `colloquy-web` wraps a [`ConversationSession`] in an axum server: clients
//! configure and start the conversation over REST, then follow it as
//! Server-Sent Events or over a WebSocket. Both streaming endpoints can
//! replay the history so far before going live.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use colloquy::config::ConversationConfig;
//! use colloquy_web::{ConversationSession, WebConfig, spawn_web};
//!
//! let session = Arc::new(ConversationSession::from_env(ConversationConfig::server_default()));
//! let addr = spawn_web(session.clone(), WebConfig::default()).await?;
//! println!("Listening on http://{addr}");
//! ```
//!
//! # Endpoints
//!
//! | Method | Path              | Purpose                                           |
//! |--------|-------------------|---------------------------------------------------|
//! | POST   | `/configure`      | Replace the configuration (before start only)     |
//! | POST   | `/start`          | Start the run; returns 202 immediately            |
//! | GET    | `/history/stream` | SSE, `?replay=false` for live only                |
//! | POST   | `/history/stream` | SSE, body `{"sendPrevMessages": bool}`            |
//! | GET    | `/ws`             | WebSocket, `?replay=false` for live only          |
//! | GET    | `/api/state`      | Run status, progress, configuration               |
//! | POST   | `/api/control`    | `{"action": "stop"}` cancels the run              |
//!
//! # Architecture
//!
//! ```text
//! /start ──▶ ConversationSession ──spawn──▶ driver ──publish──▶ HistoryHub
//!                                                                  │
//!                      SSE / WebSocket clients ◀──Subscription─────┘
//! ```

mod api;
mod server;
pub mod session;
mod stream;
mod ws;

pub use server::build_router;
pub use session::{ConversationSession, RosterFactory, SessionError, SessionSnapshot};
pub use ws::WsFrame;

use std::net::SocketAddr;
use std::sync::Arc;

/// Configuration for the web server.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:8080`.
    pub bind_addr: SocketAddr,
    /// Whether stream requests that don't say otherwise replay the history
    /// before going live. Default: `true`.
    pub replay_by_default: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            replay_by_default: true,
        }
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down.
pub async fn spawn_web(
    session: Arc<ConversationSession>,
    config: WebConfig,
) -> std::io::Result<SocketAddr> {
    let router = server::build_router(session, config.replay_by_default);
    server::start_server(router, config.bind_addr).await
}
