//! Native Anthropic Messages API agent.
//!
//! The Messages API takes the system prompt as a top-level `system` field
//! rather than a message, only knows `user` and `assistant` roles, and wants
//! the conversation to open and close on a `user` turn.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{Agent, AgentFuture, ModelProfile, http_client, normalize_response, persona_prompt};
use crate::{Message, ProviderError};

pub const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Filler user turn used where the API requires one and the transcript has none.
pub const CONTINUE_PROMPT: &str = "Continue the conversation";

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnthropicRole {
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AnthropicMessage {
    pub role: AnthropicRole,
    pub content: String,
}

/// The request body minus model and sampling settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnthropicPrompt {
    pub system: Option<String>,
    pub messages: Vec<AnthropicMessage>,
}

#[derive(Serialize, Debug)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Deserialize, Debug)]
struct RawMessagesResponse {
    #[serde(default)]
    content: Vec<RawContentBlock>,
    error: Option<RawError>,
}

#[derive(Deserialize, Debug)]
struct RawContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawError {
    message: String,
}

// ── Agent ──────────────────────────────────────────────────────────

/// A participant backed by the Anthropic Messages API.
pub struct AnthropicAgent {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    display_name: String,
    profile: ModelProfile,
}

impl AnthropicAgent {
    /// Create an agent named `"{name} ({model})"`.
    pub fn new(name: &str, model: &str, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let profile = ModelProfile::for_model(model);
        Ok(Self {
            client: http_client()?,
            endpoint: ANTHROPIC_URL.to_string(),
            api_key: api_key.into(),
            display_name: format!("{name} ({})", profile.name),
            profile,
        })
    }

    /// Point the agent at a different endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn complete(&self, transcript: &[Message]) -> Result<String, ProviderError> {
        let prompt = to_anthropic_prompt(&self.display_name, transcript);
        let body = MessagesRequest {
            model: &self.profile.name,
            max_tokens: self.profile.max_response_tokens,
            temperature: self.profile.temperature,
            system: prompt.system,
            messages: prompt.messages,
        };
        debug!(
            "LLM request: provider=anthropic, model={}, messages={}, max_tokens={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::Request(format!("failed to read response: {e}")))?;
        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );
        trace!("LLM response body: {text}");

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let content = parse_messages_response(&text)?
            .ok_or_else(|| ProviderError::EmptyResponse(self.display_name.clone()))?;
        Ok(normalize_response(&self.display_name, &content))
    }
}

impl Agent for AnthropicAgent {
    fn name(&self) -> &str {
        &self.display_name
    }

    fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    fn generate<'a>(&'a self, transcript: &'a [Message]) -> AgentFuture<'a> {
        Box::pin(self.complete(transcript))
    }
}

// ── Translation ────────────────────────────────────────────────────

/// Map a transcript onto the Messages API from `display_name`'s point of view.
///
/// The System message becomes the top-level `system` prompt. Other speakers'
/// turns are `user` messages prefixed with the speaker. A [`CONTINUE_PROMPT`]
/// user turn is inserted when the conversation would otherwise start or end
/// on the agent's own turn, or be empty.
pub fn to_anthropic_prompt(display_name: &str, transcript: &[Message]) -> AnthropicPrompt {
    let mut system = None;
    let mut messages = Vec::with_capacity(transcript.len() + 1);
    for msg in transcript {
        if msg.is_system() {
            system = Some(persona_prompt(display_name, &msg.content));
        } else if msg.from == display_name {
            messages.push(AnthropicMessage {
                role: AnthropicRole::Assistant,
                content: msg.content.clone(),
            });
        } else {
            messages.push(AnthropicMessage {
                role: AnthropicRole::User,
                content: format!("{}: {}", msg.from, msg.content),
            });
        }
    }

    let continue_turn = || AnthropicMessage {
        role: AnthropicRole::User,
        content: CONTINUE_PROMPT.to_string(),
    };
    if messages.first().is_some_and(|m| m.role == AnthropicRole::Assistant) {
        messages.insert(0, continue_turn());
    }
    if messages.last().is_none_or(|m| m.role == AnthropicRole::Assistant) {
        messages.push(continue_turn());
    }

    AnthropicPrompt { system, messages }
}

/// Concatenate the text blocks of a response. `Ok(None)` when there are none.
fn parse_messages_response(body: &str) -> Result<Option<String>, ProviderError> {
    let parsed: RawMessagesResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;

    if let Some(err) = parsed.error {
        return Err(ProviderError::Other(format!("API error: {}", err.message)));
    }

    let text: String = parsed
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();
    Ok(Some(text).filter(|t| !t.trim().is_empty()))
}
