//! Server-Sent Events view of the conversation history.
//!
//! Each published message becomes one `data:` event carrying the message as
//! JSON. With replay (the default) a client first receives everything
//! published so far, then follows live. Dropping the connection drops the
//! subscription.

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use colloquy::Message;
use colloquy::history::HistoryHub;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::error_response;

/// Shared state for the streaming handlers (SSE and WebSocket).
#[derive(Clone)]
pub struct StreamState {
    pub hub: HistoryHub,
    /// Replay setting used when a request does not specify one.
    pub replay_by_default: bool,
}

/// Query string accepted by the GET stream endpoints.
#[derive(Deserialize, Default)]
pub struct ReplayQuery {
    pub replay: Option<bool>,
}

/// Request body for POST /history/stream.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    pub send_prev_messages: Option<bool>,
}

/// GET /history/stream?replay=<bool>
pub async fn get_history_stream(
    State(state): State<StreamState>,
    Query(query): Query<ReplayQuery>,
) -> Response {
    let replay = query.replay.unwrap_or(state.replay_by_default);
    history_stream(&state.hub, replay)
}

/// POST /history/stream with `{"sendPrevMessages": bool}`.
///
/// An empty body uses the default replay setting; a malformed one is 400.
pub async fn post_history_stream(State(state): State<StreamState>, body: Bytes) -> Response {
    let replay = if body.iter().all(u8::is_ascii_whitespace) {
        state.replay_by_default
    } else {
        match serde_json::from_slice::<StreamRequest>(&body) {
            Ok(req) => req.send_prev_messages.unwrap_or(state.replay_by_default),
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, format!("invalid JSON body: {e}"));
            }
        }
    };
    history_stream(&state.hub, replay)
}

fn history_stream(hub: &HistoryHub, replay: bool) -> Response {
    let subscription = match hub.subscribe(replay) {
        Ok(subscription) => subscription,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    };
    debug!("SSE client attached as subscriber {}", subscription.id());

    let events = subscription
        .filter_map(|message| std::future::ready(to_event(&message).map(Ok::<_, Infallible>)));
    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn to_event(message: &Message) -> Option<Event> {
    match Event::default().json_data(message) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Failed to encode message from {}: {e}", message.from);
            None
        }
    }
}
