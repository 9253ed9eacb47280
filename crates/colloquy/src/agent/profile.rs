//! Per-model token budgets and sampling defaults.

use serde::{Deserialize, Serialize};

use crate::context::Budget;

/// Context window used for models missing from the known-model table.
const FALLBACK_CONTEXT_WINDOW: usize = 8_192;
/// Response cap used for models missing from the known-model table.
const FALLBACK_MAX_RESPONSE: usize = 1_024;
const FALLBACK_TEMPERATURE: f32 = 0.7;

/// Token-window and sampling profile of the model behind an agent.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModelProfile {
    /// Model identifier as sent to the backend.
    pub name: String,
    /// Total tokens the model accepts for prompt plus response.
    pub context_window_tokens: usize,
    /// Tokens reserved for (and requested as) the model's response.
    pub max_response_tokens: usize,
    pub temperature: f32,
}

impl ModelProfile {
    pub fn new(
        name: impl Into<String>,
        context_window_tokens: usize,
        max_response_tokens: usize,
        temperature: f32,
    ) -> Self {
        Self {
            name: name.into(),
            context_window_tokens,
            max_response_tokens,
            temperature,
        }
    }

    /// Look up a model in the known-model table.
    pub fn known(model: &str) -> Option<Self> {
        KNOWN_MODELS
            .iter()
            .find(|(name, ..)| *name == model)
            .map(|&(name, window, max_response, temperature)| {
                Self::new(name, window, max_response, temperature)
            })
    }

    /// Look up a model, falling back to a conservative profile when unknown.
    pub fn for_model(model: &str) -> Self {
        Self::known(model).unwrap_or_else(|| {
            Self::new(
                model,
                FALLBACK_CONTEXT_WINDOW,
                FALLBACK_MAX_RESPONSE,
                FALLBACK_TEMPERATURE,
            )
        })
    }

    /// Override the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// The budget the context window manager enforces for this model.
    pub fn budget(&self) -> Budget {
        Budget::new(self.context_window_tokens, self.max_response_tokens)
    }
}

/// `(model, context_window_tokens, max_response_tokens, temperature)`.
const KNOWN_MODELS: &[(&str, usize, usize, f32)] = &[
    ("gpt-4", 128_000, 2_048, 0.7),
    ("gpt-4o", 128_000, 4_096, 0.7),
    ("claude-3-5-sonnet-20240620", 128_000, 4_096, 0.7),
    ("anthropic/claude-3.5-sonnet", 200_000, 4_096, 0.7),
    ("gemini-1.5-flash", 128_000, 2_048, 0.7),
    ("google/gemini-flash-1.5", 128_000, 2_048, 0.7),
    ("deepseek-chat", 64_000, 2_048, 1.0),
];
