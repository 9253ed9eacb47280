//! Native Google Gemini agent over the `generateContent` REST API.
//!
//! Gemini takes the persona as a `systemInstruction`, calls the assistant
//! role `model`, and is always asked to go on with a final user turn.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::anthropic::CONTINUE_PROMPT;
use super::{Agent, AgentFuture, ModelProfile, http_client, normalize_response, persona_prompt};
use crate::{Message, ProviderError};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GeminiRole {
    User,
    Model,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Part {
    pub text: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<GeminiRole>,
    pub parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<GeminiRole>, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: usize,
    temperature: f32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Deserialize, Debug)]
struct RawGenerateResponse {
    candidates: Option<Vec<RawCandidate>>,
    error: Option<RawError>,
}

#[derive(Deserialize, Debug)]
struct RawCandidate {
    content: Option<Content>,
}

#[derive(Deserialize, Debug)]
struct RawError {
    message: String,
}

// ── Agent ──────────────────────────────────────────────────────────

/// A participant backed by Gemini's `generateContent` endpoint.
pub struct GeminiAgent {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    display_name: String,
    profile: ModelProfile,
}

impl GeminiAgent {
    /// Create an agent named `"{name} ({model})"`.
    pub fn new(name: &str, model: &str, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let profile = ModelProfile::for_model(model);
        Ok(Self {
            client: http_client()?,
            base_url: GEMINI_BASE_URL.to_string(),
            api_key: api_key.into(),
            display_name: format!("{name} ({})", profile.name),
            profile,
        })
    }

    /// Point the agent at a different API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.profile.name
        )
    }

    async fn complete(&self, transcript: &[Message]) -> Result<String, ProviderError> {
        let mut body = to_gemini_request(&self.display_name, transcript);
        body.generation_config = Some(GenerationConfig {
            max_output_tokens: self.profile.max_response_tokens,
            temperature: self.profile.temperature,
        });
        debug!(
            "LLM request: provider=gemini, model={}, contents={}",
            self.profile.name,
            body.contents.len(),
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
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

        let content = parse_generate_response(&text)?
            .ok_or_else(|| ProviderError::EmptyResponse(self.display_name.clone()))?;
        Ok(normalize_response(&self.display_name, &content))
    }
}

impl Agent for GeminiAgent {
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

/// Map a transcript onto a `generateContent` request from `display_name`'s
/// point of view. Generation settings are left unset.
pub fn to_gemini_request(display_name: &str, transcript: &[Message]) -> GenerateRequest {
    let mut system_instruction = None;
    let mut contents = Vec::with_capacity(transcript.len() + 1);
    for msg in transcript {
        if msg.is_system() {
            system_instruction = Some(Content::text(
                None,
                persona_prompt(display_name, &msg.content),
            ));
        } else if msg.from == display_name {
            contents.push(Content::text(Some(GeminiRole::Model), msg.content.clone()));
        } else {
            contents.push(Content::text(
                Some(GeminiRole::User),
                format!("{}: {}", msg.from, msg.content),
            ));
        }
    }
    contents.push(Content::text(Some(GeminiRole::User), CONTINUE_PROMPT));

    GenerateRequest {
        system_instruction,
        contents,
        generation_config: None,
    }
}

/// Text of the first candidate. `Ok(None)` when the model said nothing.
fn parse_generate_response(body: &str) -> Result<Option<String>, ProviderError> {
    let parsed: RawGenerateResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;

    if let Some(err) = parsed.error {
        return Err(ProviderError::Other(format!("API error: {}", err.message)));
    }

    Ok(parsed
        .candidates
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .map(|p| p.text)
                .collect::<String>()
        })
        .filter(|t| !t.trim().is_empty()))
}
