//! Turn-based multi-agent dialogue engine with replayable live history.
//!
//! `colloquy` runs a round-robin conversation between pluggable response
//! generators ([`Agent`](agent::Agent) implementors) and republishes every
//! appended message to any number of observers through a
//! [`HistoryHub`](history::HistoryHub). Observers may join mid-conversation,
//! replay everything published so far, and then follow the conversation live
//! without gaps or duplicates.
//!
//! # Getting started
//!
//! ```ignore
//! use colloquy::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let config = ConversationConfig::default().with_turns(6);
//!     let roster = build_roster(&config, &EnvCredentials::from_env())
//!         .map_err(|e| e.to_string())?;
//!     let prompt = config.rendered_prompt(roster.len());
//!
//!     let conversation = Conversation::new(roster).map_err(|e| e.to_string())?;
//!     let hub = HistoryHub::new(HubConfig::default());
//!
//!     // Observers can subscribe at any time, before or after the run starts.
//!     let mut live = hub.subscribe(true).map_err(|e| e.to_string())?;
//!
//!     let handle = spawn_conversation(
//!         conversation,
//!         hub.clone(),
//!         prompt,
//!         config.turns,
//!         CancellationToken::new(),
//!     );
//!     let report = handle
//!         .await
//!         .map_err(|e| e.to_string())?
//!         .map_err(|e| e.to_string())?;
//!
//!     // Shutting the hub down ends `live` once it has drained.
//!     hub.shutdown();
//!     while let Some(message) = live.recv().await {
//!         println!("{message}");
//!     }
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Participants:** the [`Agent`](agent::Agent) trait, the closure-backed
//!   [`FnAgent`](agent::FnAgent), and the OpenAI-compatible
//!   [`ChatCompletionsAgent`](agent::openai::ChatCompletionsAgent). Token
//!   budgets live in [`ModelProfile`](agent::profile::ModelProfile).
//! - **Context budgets:** [`ContextWindowManager`](context::ContextWindowManager)
//!   trims each agent's view of the transcript so it fits the agent's window,
//!   using a pluggable [`TokenEstimator`](context::TokenEstimator).
//! - **Turn taking:** [`Conversation`](conversation::Conversation) is the
//!   state machine; [`run_conversation`](conversation::run_conversation) and
//!   [`spawn_conversation`](conversation::spawn_conversation) drive it for a
//!   bounded number of turns.
//! - **Observers:** [`HistoryHub`](history::HistoryHub) fans messages out to
//!   [`Subscription`](history::Subscription)s with per-subscriber bounded
//!   buffers.
//! - **Setup:** [`ConversationConfig`](config::ConversationConfig) and
//!   [`build_roster`](roster::build_roster).

pub mod agent;
pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod history;
pub mod prelude;
pub mod presentation;
pub mod roster;

pub use error::{ConfigError, Error, ProviderError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Constants ──────────────────────────────────────────────────────

/// Reserved sender identity for the conversation's opening instruction.
pub const SYSTEM_SENDER: &str = "System";

// ── Message ────────────────────────────────────────────────────────

/// A single entry of the transcript.
///
/// Messages are values: once appended they are only ever cloned, never
/// edited. Their order in the transcript is the order of appends.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Display identity of the author, or [`SYSTEM_SENDER`].
    pub from: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// A message authored by the reserved System identity.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(SYSTEM_SENDER, content)
    }

    /// A message authored by `from`, stamped with the current time.
    pub fn new(from: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.from == SYSTEM_SENDER
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.from, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_constructor_uses_reserved_sender() {
        let msg = Message::system("discuss");
        assert_eq!(msg.from, SYSTEM_SENDER);
        assert!(msg.is_system());
        assert!(!Message::new("User 1 (gpt-4)", "hi").is_system());
    }

    #[test]
    fn message_serializes_with_rfc3339_timestamp() {
        let msg = Message::new("User 1 (gpt-4)", "hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["from"], "User 1 (gpt-4)");
        assert_eq!(json["content"], "hello");
        let ts = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn message_display_is_sender_prefixed() {
        let msg = Message::new("A", "r1");
        assert_eq!(msg.to_string(), "A: r1");
    }
}
