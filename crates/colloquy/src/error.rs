//! Error types for the conversation core, agent backends, and configuration.

use std::path::PathBuf;

use thiserror::Error;

use crate::conversation::ConversationState;

/// Errors surfaced by the [`Conversation`](crate::conversation::Conversation)
/// engine and the [`HistoryHub`](crate::history::HistoryHub).
#[derive(Debug, Error)]
pub enum Error {
    /// The operation is not valid for the engine's current state
    /// (double start, turn before start, turn after completion).
    #[error("cannot {operation} while the conversation is {state}")]
    InvalidState {
        operation: &'static str,
        state: ConversationState,
    },

    #[error("conversation roster is empty")]
    EmptyRoster,

    /// An agent's generation call failed. The turn was not applied.
    #[error("agent {agent} failed to generate a response: {cause}")]
    AgentGenerationFailed {
        agent: String,
        #[source]
        cause: ProviderError,
    },

    #[error("history hub has been shut down")]
    HubClosed,

    /// An agent backend could not be constructed while assembling a roster.
    #[error("failed to set up agent {agent}: {cause}")]
    AgentSetup {
        agent: String,
        #[source]
        cause: ProviderError,
    },
}

/// Failures reported by an [`Agent`](crate::agent::Agent) backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The backend answered but produced no text.
    #[error("empty response from {0}")]
    EmptyResponse(String),

    #[error("{0}")]
    Other(String),
}

/// Failures loading or writing a [`ConversationConfig`](crate::config::ConversationConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_names_operation_and_state() {
        let err = Error::InvalidState {
            operation: "start",
            state: ConversationState::Running,
        };
        assert_eq!(
            err.to_string(),
            "cannot start while the conversation is running"
        );
    }

    #[test]
    fn generation_failure_keeps_cause_as_source() {
        let err = Error::AgentGenerationFailed {
            agent: "User 1 (gpt-4)".into(),
            cause: ProviderError::Status {
                status: 429,
                body: "rate limited".into(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("User 1 (gpt-4)"));
        assert!(msg.contains("HTTP 429"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
