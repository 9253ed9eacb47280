//! Conversation setup: prompt, turn count, and roster composition.
//!
//! The on-disk format is JSON. Missing fields fall back to their defaults,
//! so an older or hand-trimmed file still loads.
//!
//! ```ignore
//! let config = ConversationConfig::load_or_create("config.json")?
//!     .with_turns(10)
//!     .with_deepseek_participants(2);
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ConfigError;
use crate::history::DEFAULT_BUFFER_CAPACITY;

/// Opening instruction used when none is configured. `%d` is replaced with
/// the number of participants.
pub const DEFAULT_PROMPT: &str = "This is a discussion between %d participants. \
Your mission is to discuss whether AI should be closed source or open source. \
Consider the implications for innovation, safety, transparency, and societal impact. \
Discuss the pros and cons of both approaches, potential hybrid models, and the role \
of regulation in AI development. You are one of the participants. Write short answers.";

/// Everything needed to assemble and run one conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ConversationConfig {
    /// Opening System instruction. `%d` expands to the roster size.
    pub initial_prompt: String,
    /// Number of turns to take after the opening.
    pub turns: usize,
    pub openai_participant_size: usize,
    /// Claude participants, served through OpenRouter.
    pub anthropic_participant_size: usize,
    pub deepseek_participant_size: usize,
    /// Gemini participants, served through OpenRouter.
    pub gemini_participant_size: usize,
    /// Participants on a local Ollama server.
    pub ollama_participant_size: usize,
    /// Per-observer buffer of the history hub.
    pub hub_buffer: usize,
}

impl Default for ConversationConfig {
    /// One participant per provider, five turns.
    fn default() -> Self {
        Self {
            initial_prompt: DEFAULT_PROMPT.to_string(),
            turns: 5,
            openai_participant_size: 1,
            anthropic_participant_size: 1,
            deepseek_participant_size: 1,
            gemini_participant_size: 1,
            ollama_participant_size: 1,
            hub_buffer: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl ConversationConfig {
    /// Defaults for a long-running server: five DeepSeek participants,
    /// one hundred turns.
    pub fn server_default() -> Self {
        Self {
            turns: 100,
            openai_participant_size: 0,
            anthropic_participant_size: 0,
            deepseek_participant_size: 5,
            gemini_participant_size: 0,
            ollama_participant_size: 0,
            ..Self::default()
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.initial_prompt = prompt.into();
        self
    }

    pub fn with_turns(mut self, turns: usize) -> Self {
        self.turns = turns;
        self
    }

    pub fn with_openai_participants(mut self, n: usize) -> Self {
        self.openai_participant_size = n;
        self
    }

    pub fn with_anthropic_participants(mut self, n: usize) -> Self {
        self.anthropic_participant_size = n;
        self
    }

    pub fn with_deepseek_participants(mut self, n: usize) -> Self {
        self.deepseek_participant_size = n;
        self
    }

    pub fn with_gemini_participants(mut self, n: usize) -> Self {
        self.gemini_participant_size = n;
        self
    }

    pub fn with_ollama_participants(mut self, n: usize) -> Self {
        self.ollama_participant_size = n;
        self
    }

    pub fn with_hub_buffer(mut self, hub_buffer: usize) -> Self {
        self.hub_buffer = hub_buffer;
        self
    }

    /// Total participants requested across providers, before credentials
    /// are taken into account.
    pub fn requested_participants(&self) -> usize {
        self.openai_participant_size
            + self.anthropic_participant_size
            + self.deepseek_participant_size
            + self.gemini_participant_size
            + self.ollama_participant_size
    }

    /// The opening instruction with `%d` replaced by `participants`.
    pub fn rendered_prompt(&self, participants: usize) -> String {
        self.initial_prompt.replace("%d", &participants.to_string())
    }

    /// Read the config at `path`. If the file does not exist, write the
    /// defaults there and return them.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_or_create_with(path, Self::default)
    }

    /// Like [`load_or_create`](Self::load_or_create), with a custom default.
    pub fn load_or_create_with(
        path: impl AsRef<Path>,
        default: impl FnOnce() -> Self,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = default();
                config.save(path)?;
                info!("Wrote default config to {}", path.display());
                Ok(config)
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Write as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
