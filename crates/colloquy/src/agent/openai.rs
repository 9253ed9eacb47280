//! OpenAI-compatible chat-completions agent.
//!
//! One client covers every backend that speaks the `/chat/completions`
//! protocol: OpenAI, DeepSeek, OpenRouter (which fronts Anthropic and Google
//! models), and Ollama's compatibility endpoint. Backend identity only
//! affects the endpoint URL and the `Authorization` header.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{Agent, AgentFuture, ModelProfile, http_client, normalize_response, persona_prompt};
use crate::{Message, ProviderError};

pub const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEEPSEEK_URL: &str = "https://api.deepseek.com/chat/completions";
pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Which service a [`ChatCompletionsAgent`] talks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    DeepSeek,
    OpenRouter,
    /// A local Ollama server, e.g. `http://localhost:11434`.
    Ollama { host: String },
}

impl Provider {
    /// Full chat-completions endpoint URL.
    pub fn endpoint(&self) -> String {
        match self {
            Provider::OpenAi => OPENAI_URL.to_string(),
            Provider::DeepSeek => DEEPSEEK_URL.to_string(),
            Provider::OpenRouter => OPENROUTER_URL.to_string(),
            Provider::Ollama { host } => {
                format!("{}/v1/chat/completions", host.trim_end_matches('/'))
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::DeepSeek => "deepseek",
            Provider::OpenRouter => "openrouter",
            Provider::Ollama { .. } => "ollama",
        }
    }
}

// ── Wire types ─────────────────────────────────────────────────────

/// Chat role on the wire.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    System,
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WireMessage {
    pub role: WireRole,
    pub content: String,
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

// ── Agent ──────────────────────────────────────────────────────────

/// A participant backed by an OpenAI-compatible chat-completions endpoint.
pub struct ChatCompletionsAgent {
    client: reqwest::Client,
    provider: Provider,
    endpoint: String,
    api_key: Option<String>,
    display_name: String,
    profile: ModelProfile,
}

impl ChatCompletionsAgent {
    /// Create an agent named `"{name} ({model})"`.
    ///
    /// The model's token budget comes from [`ModelProfile::for_model`].
    pub fn new(
        name: &str,
        provider: Provider,
        model: &str,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        Self::with_profile(name, provider, ModelProfile::for_model(model), api_key)
    }

    /// Create an agent with an explicit model profile.
    pub fn with_profile(
        name: &str,
        provider: Provider,
        profile: ModelProfile,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client()?,
            endpoint: provider.endpoint(),
            provider,
            api_key,
            display_name: format!("{name} ({})", profile.name),
            profile,
        })
    }

    /// Point the agent at a different endpoint (proxies, local mocks).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    async fn complete(&self, transcript: &[Message]) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.profile.name,
            messages: to_wire_messages(&self.display_name, transcript),
            max_tokens: self.profile.max_response_tokens,
            temperature: self.profile.temperature,
            stream: false,
        };
        debug!(
            "LLM request: provider={}, model={}, messages={}, max_tokens={}, temp={}",
            self.provider.label(),
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );

        let start = Instant::now();
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let resp = request
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

        let content = parse_completion(&text)?
            .ok_or_else(|| ProviderError::EmptyResponse(self.display_name.clone()))?;
        Ok(normalize_response(&self.display_name, &content))
    }
}

impl Agent for ChatCompletionsAgent {
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

/// Map a transcript onto chat roles from the point of view of `display_name`.
///
/// The System message becomes the persona-setting system prompt, the agent's
/// own turns become `assistant`, and everyone else's turns become `user`
/// prefixed with the speaker so the model can tell participants apart.
pub fn to_wire_messages(display_name: &str, transcript: &[Message]) -> Vec<WireMessage> {
    transcript
        .iter()
        .map(|msg| {
            if msg.is_system() {
                WireMessage {
                    role: WireRole::System,
                    content: persona_prompt(display_name, &msg.content),
                }
            } else if msg.from == display_name {
                WireMessage {
                    role: WireRole::Assistant,
                    content: msg.content.clone(),
                }
            } else {
                WireMessage {
                    role: WireRole::User,
                    content: format!("{}: {}", msg.from, msg.content),
                }
            }
        })
        .collect()
}

/// Extract the first choice's text. `Ok(None)` when the model said nothing.
fn parse_completion(body: &str) -> Result<Option<String>, ProviderError> {
    let parsed: RawChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;

    if let Some(err) = parsed.error {
        return Err(ProviderError::Other(format!("API error: {}", err.message)));
    }

    Ok(parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty()))
}
