//! Axum server setup and router construction.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::api::{self, AppState};
use crate::session::ConversationSession;
use crate::stream::{self, StreamState};
use crate::ws;

/// Build the full axum router.
///
/// The router serves:
/// - Control endpoints `/configure` and `/start`
/// - The history as Server-Sent Events at `/history/stream`
/// - The history over WebSocket at `/ws`
/// - REST API at `/api/*`
pub fn build_router(session: Arc<ConversationSession>, replay_by_default: bool) -> Router {
    let stream_state = StreamState {
        hub: session.hub().clone(),
        replay_by_default,
    };
    let app_state = AppState { session };

    // Permissive CORS so browser frontends on other origins can connect.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let stream_routes = Router::new()
        .route(
            "/history/stream",
            get(stream::get_history_stream).post(stream::post_history_stream),
        )
        .route("/ws", get(ws::ws_upgrade))
        .with_state(stream_state);

    let api_routes = Router::new()
        .route("/configure", post(api::post_configure))
        .route("/start", post(api::post_start))
        .route("/api/state", get(api::get_state))
        .route("/api/control", post(api::post_control))
        .with_state(app_state);

    Router::new()
        .merge(stream_routes)
        .merge(api_routes)
        .layer(cors)
}

/// Bind `bind_addr`, serve `router` on a background task, and return the
/// bound address (useful with port 0).
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    info!("Listening on http://{addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Server error: {e}");
        }
    });

    Ok(addr)
}
