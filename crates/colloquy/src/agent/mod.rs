//! The agent capability: anything that can produce the next message of a
//! conversation from the transcript so far.
//!
//! The engine only ever talks to agents through the [`Agent`] trait. Backends
//! adapt it to whatever service they wrap:
//!
//! - [`openai::ChatCompletionsAgent`]: OpenAI-compatible chat completions
//!   (OpenAI, DeepSeek, OpenRouter, Ollama).
//! - [`anthropic::AnthropicAgent`]: the Anthropic Messages API.
//! - [`gemini::GeminiAgent`]: Google's `generateContent` API.
//! - [`FnAgent`]: a closure, for tests and embedding.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod profile;

pub use anthropic::AnthropicAgent;
pub use gemini::GeminiAgent;
pub use openai::{ChatCompletionsAgent, Provider};
pub use profile::ModelProfile;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::{Message, ProviderError};

/// Boxed future returned by [`Agent::generate`].
pub type AgentFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>>;

/// Shared handle to a roster entry.
pub type SharedAgent = Arc<dyn Agent>;

/// A conversation participant.
///
/// Agents carry no conversation state: each call receives the (already
/// budget-trimmed) view of the transcript and returns the text of the next
/// message. The display name must stay stable for the agent's lifetime since
/// it is how the agent recognizes its own earlier turns.
///
/// # Example
///
/// ```ignore
/// struct Echo { profile: ModelProfile }
///
/// impl Agent for Echo {
///     fn name(&self) -> &str { "Echo" }
///     fn profile(&self) -> &ModelProfile { &self.profile }
///
///     fn generate<'a>(&'a self, transcript: &'a [Message]) -> AgentFuture<'a> {
///         Box::pin(async move {
///             let last = transcript.last().map(|m| m.content.clone());
///             last.ok_or_else(|| ProviderError::EmptyResponse("echo".into()))
///         })
///     }
/// }
/// ```
pub trait Agent: Send + Sync {
    /// Stable display identity, used as the `from` of this agent's messages.
    fn name(&self) -> &str;

    /// Token budget and sampling profile of the underlying model.
    fn profile(&self) -> &ModelProfile;

    /// Produce the content of the next message.
    ///
    /// Uses a boxed future so that the trait is dyn-compatible.
    fn generate<'a>(&'a self, transcript: &'a [Message]) -> AgentFuture<'a>;
}

// ── Shared backend helpers ─────────────────────────────────────────

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP client shared by the network backends' constructors.
pub(crate) fn http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent("colloquy/0.1")
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {e}")))
}

/// System instruction that casts the model as `display_name` and asks it to
/// prefix its replies with that name.
pub fn persona_prompt(display_name: &str, instruction: &str) -> String {
    format!("You are {display_name}. {instruction}. Respond in format: {display_name}: <response>")
}

/// Trim the model output and make sure it carries the speaker prefix.
pub fn normalize_response(display_name: &str, content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.starts_with(display_name) {
        trimmed.to_string()
    } else {
        format!("{display_name}: {trimmed}")
    }
}

/// An agent backed by a synchronous closure.
///
/// # Example
///
/// ```ignore
/// let agent = FnAgent::new("A", ModelProfile::for_model("stub"), |view| {
///     Ok(format!("saw {} messages", view.len()))
/// });
/// ```
pub struct FnAgent<F>
where
    F: Fn(&[Message]) -> Result<String, ProviderError> + Send + Sync,
{
    name: String,
    profile: ModelProfile,
    f: F,
}

impl<F> FnAgent<F>
where
    F: Fn(&[Message]) -> Result<String, ProviderError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, profile: ModelProfile, f: F) -> Self {
        Self {
            name: name.into(),
            profile,
            f,
        }
    }
}

impl<F> Agent for FnAgent<F>
where
    F: Fn(&[Message]) -> Result<String, ProviderError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    fn generate<'a>(&'a self, transcript: &'a [Message]) -> AgentFuture<'a> {
        let result = (self.f)(transcript);
        Box::pin(std::future::ready(result))
    }
}
