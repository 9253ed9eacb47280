//! WebSocket view of the conversation history.
//!
//! Each connected client receives:
//! 1. A `subscribed` frame carrying its subscriber id.
//! 2. One `message` frame per published message (replayed history first
//!    unless `?replay=false`).
//! 3. A `closed` frame if the hub ends the subscription.
//!
//! Incoming frames are ignored apart from close.

use axum::extract::ws::{Message as WsFrameMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use colloquy::Message;
use colloquy::history::{SubscriberId, Subscription};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::debug;

use crate::api::error_response;
use crate::stream::{ReplayQuery, StreamState};

/// A frame sent from the server to WebSocket clients.
///
/// Discriminated on the `type` field when serialized to JSON.
#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsFrame<'a> {
    /// First frame on every connection.
    Subscribed { subscriber_id: SubscriberId },
    /// A transcript message, fields inlined.
    Message {
        #[serde(flatten)]
        message: &'a Message,
    },
    /// The subscription was ended by the server (hub shut down or the
    /// client fell too far behind).
    Closed,
}

/// GET /ws?replay=<bool>: WebSocket upgrade handler.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<StreamState>,
    Query(query): Query<ReplayQuery>,
) -> Response {
    let replay = query.replay.unwrap_or(state.replay_by_default);
    // Subscribe before upgrading so nothing published in between is missed.
    match state.hub.subscribe(replay) {
        Ok(subscription) => ws
            .on_upgrade(move |socket| handle_socket(socket, subscription))
            .into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, mut subscription: Subscription) {
    let (mut sink, mut stream) = socket.split();
    let id = subscription.id();

    if ws_send(&mut sink, &WsFrame::Subscribed { subscriber_id: id })
        .await
        .is_err()
    {
        return;
    }
    debug!("WebSocket client connected as subscriber {id}");

    // Forward hub messages; the subscription is dropped with the task.
    let forward_task = tokio::spawn(async move {
        while let Some(message) = subscription.recv().await {
            if ws_send(&mut sink, &WsFrame::Message { message: &message })
                .await
                .is_err()
            {
                return; // Client disconnected.
            }
        }
        let _ = ws_send(&mut sink, &WsFrame::Closed).await;
        let _ = sink.close().await;
    });

    while let Some(Ok(frame)) = stream.next().await {
        if let WsFrameMessage::Close(_) = frame {
            break;
        }
    }

    debug!("WebSocket subscriber {id} disconnected");
    forward_task.abort();
}

/// Serialize a frame and send it over the WebSocket sink.
async fn ws_send(
    sink: &mut SplitSink<WebSocket, WsFrameMessage>,
    frame: &WsFrame<'_>,
) -> Result<(), ()> {
    let json = serde_json::to_string(frame).map_err(|_| ())?;
    sink.send(WsFrameMessage::Text(json.into()))
        .await
        .map_err(|_| ())
}
