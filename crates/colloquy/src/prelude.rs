//! Convenience re-exports for common `colloquy` types.
//!
//! ```ignore
//! use colloquy::prelude::*;
//! ```
//!
//! Covers building a roster, running a conversation, and observing it.
//! Wire types and estimator internals are left out; import those from their
//! modules directly.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ConfigError, Error, Message, ProviderError, SYSTEM_SENDER};

// ── Agents ──────────────────────────────────────────────────────────
pub use crate::agent::{
    Agent, AgentFuture, AnthropicAgent, ChatCompletionsAgent, FnAgent, GeminiAgent, ModelProfile,
    Provider, SharedAgent,
};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{Budget, CharRatio, ContextWindowManager, TokenEstimator, WordHeuristic};

// ── Conversation ────────────────────────────────────────────────────
pub use crate::conversation::{
    Conversation, ConversationState, RunOutcome, RunReport, run_conversation, spawn_conversation,
};

// ── Observers ───────────────────────────────────────────────────────
pub use crate::history::{HistoryHub, HubConfig, SubscriberId, Subscription};

// ── Setup & presentation ────────────────────────────────────────────
pub use crate::config::ConversationConfig;
pub use crate::presentation::{Color, SYSTEM_COLOR, color_for, format_line};
pub use crate::roster::{EnvCredentials, build_roster};

pub use tokio_util::sync::CancellationToken;
