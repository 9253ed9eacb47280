//! REST endpoints: configure, start, stop, and inspect the conversation.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use colloquy::config::ConversationConfig;
use serde::Deserialize;
use tracing::debug;

use crate::session::{ConversationSession, SessionError, SessionSnapshot};

/// Shared application state passed to the REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<ConversationSession>,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match &self {
            SessionError::AlreadyStarted => StatusCode::CONFLICT,
            SessionError::EmptyRoster => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::NotRunning => StatusCode::CONFLICT,
            SessionError::Conversation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, self.to_string())
    }
}

/// `{"error": "..."}` with the given status.
pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

/// POST /configure: Replace the conversation configuration.
///
/// The body is a full or partial [`ConversationConfig`]; omitted fields take
/// their defaults. Returns the applied configuration, 400 on a malformed
/// body, 409 once a run has started.
pub async fn post_configure(State(app): State<AppState>, body: Bytes) -> Response {
    let config: ConversationConfig = match serde_json::from_slice(&body) {
        Ok(config) => config,
        Err(e) => {
            debug!("Rejecting configuration: {e}");
            return error_response(StatusCode::BAD_REQUEST, format!("invalid JSON body: {e}"));
        }
    };
    match app.session.configure(config) {
        Ok(()) => Json(app.session.config()).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /start: Start the conversation in the background.
///
/// Returns 202 with the participant names immediately; progress is streamed
/// on `/history/stream` and `/ws`. 409 if already started, 503 when no
/// participant is available.
pub async fn post_start(State(app): State<AppState>) -> Response {
    match app.session.start() {
        Ok(participants) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "participants": participants })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/state: Run status, progress, and configuration.
pub async fn get_state(State(app): State<AppState>) -> Json<SessionSnapshot> {
    Json(app.session.snapshot())
}

/// Request body for POST /api/control.
#[derive(Deserialize)]
pub struct ControlRequest {
    pub action: ControlAction,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    /// Cancel the running conversation.
    Stop,
}

/// POST /api/control: Run control commands.
///
/// `stop` returns 204, or 409 when nothing is running. 400 on a malformed
/// body or an unknown action.
pub async fn post_control(State(app): State<AppState>, body: Bytes) -> Response {
    let request: ControlRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("Rejecting control request: {e}");
            return error_response(StatusCode::BAD_REQUEST, format!("invalid control request: {e}"));
        }
    };
    match request.action {
        ControlAction::Stop => match app.session.stop() {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(e) => e.into_response(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_request_deserializes() {
        let req: ControlRequest = serde_json::from_str(r#"{"action":"stop"}"#).unwrap();
        assert!(matches!(req.action, ControlAction::Stop));
    }

    #[test]
    fn session_errors_map_to_status_codes() {
        assert_eq!(
            SessionError::AlreadyStarted.into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            SessionError::EmptyRoster.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
