//! Roster assembly from a [`ConversationConfig`] and provider credentials.
//!
//! Participants are numbered `User 1..N` across providers in a fixed order
//! (OpenAI, Anthropic, Gemini, Ollama, DeepSeek). A provider without
//! credentials contributes nobody, whatever its configured count. Anthropic
//! and Gemini participants use their native APIs when `ANTHROPIC_API_KEY` or
//! `GEMINI_API_KEY` is set, and OpenRouter otherwise.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::{Error, ProviderError};
use crate::agent::{AnthropicAgent, ChatCompletionsAgent, GeminiAgent, Provider, SharedAgent};
use crate::config::ConversationConfig;

pub const OPENAI_MODEL: &str = "gpt-4";
pub const ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20240620";
pub const GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const OPENROUTER_ANTHROPIC_MODEL: &str = "anthropic/claude-3.5-sonnet";
pub const OPENROUTER_GEMINI_MODEL: &str = "google/gemini-flash-1.5";
pub const DEEPSEEK_MODEL: &str = "deepseek-chat";

/// Provider credentials. Empty values count as absent.
#[derive(Clone, Default)]
pub struct EnvCredentials {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
    /// Serves the Anthropic and Gemini participants when their native keys
    /// are missing.
    pub openrouter_api_key: Option<String>,
    pub ollama_host: Option<String>,
    pub ollama_model: Option<String>,
}

impl std::fmt::Debug for EnvCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(v: &Option<String>) -> &'static str {
            if v.is_some() { "<set>" } else { "<unset>" }
        }
        f.debug_struct("EnvCredentials")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("deepseek_api_key", &redact(&self.deepseek_api_key))
            .field("openrouter_api_key", &redact(&self.openrouter_api_key))
            .field("ollama_host", &self.ollama_host)
            .field("ollama_model", &self.ollama_model)
            .finish()
    }
}

impl EnvCredentials {
    /// Read `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `GEMINI_API_KEY`,
    /// `DEEPSEEK_API_KEY`, `OPENROUTER_API_KEY`, `OLLAMA_HOST` and
    /// `OLLAMA_MODEL`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            openai_api_key: get("OPENAI_API_KEY"),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            gemini_api_key: get("GEMINI_API_KEY"),
            deepseek_api_key: get("DEEPSEEK_API_KEY"),
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            ollama_host: get("OLLAMA_HOST"),
            ollama_model: get("OLLAMA_MODEL"),
        }
    }

    /// Read the same keys from a `.env`-format file only, ignoring the
    /// process environment.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, dotenvy::Error> {
        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(path.as_ref())? {
            let (key, value) = item?;
            vars.insert(key, value);
        }
        Ok(Self::from_lookup(|key| vars.get(key).cloned()))
    }

    /// `(host, model)` when both Ollama settings are present.
    pub fn ollama(&self) -> Option<(&str, &str)> {
        match (&self.ollama_host, &self.ollama_model) {
            (Some(host), Some(model)) => Some((host.as_str(), model.as_str())),
            _ => None,
        }
    }
}

/// How the agents of a slot reach their model.
#[derive(Clone)]
enum Backend {
    Chat {
        provider: Provider,
        api_key: Option<String>,
    },
    Anthropic {
        api_key: String,
    },
    Gemini {
        api_key: String,
    },
}

impl Backend {
    fn label(&self) -> &'static str {
        match self {
            Backend::Chat { provider, .. } => provider.label(),
            Backend::Anthropic { .. } => "anthropic",
            Backend::Gemini { .. } => "gemini",
        }
    }

    fn build(&self, name: &str, model: &str) -> Result<SharedAgent, ProviderError> {
        let agent: SharedAgent = match self {
            Backend::Chat { provider, api_key } => Arc::new(ChatCompletionsAgent::new(
                name,
                provider.clone(),
                model,
                api_key.clone(),
            )?),
            Backend::Anthropic { api_key } => {
                Arc::new(AnthropicAgent::new(name, model, api_key.clone())?)
            }
            Backend::Gemini { api_key } => {
                Arc::new(GeminiAgent::new(name, model, api_key.clone())?)
            }
        };
        Ok(agent)
    }
}

/// One slot group of the roster: which backend, which model, how many.
struct Slot {
    backend: Backend,
    model: String,
    count: usize,
}

fn openrouter(key: &str) -> Backend {
    Backend::Chat {
        provider: Provider::OpenRouter,
        api_key: Some(key.to_string()),
    }
}

fn slots(config: &ConversationConfig, creds: &EnvCredentials) -> Vec<Slot> {
    let mut slots = Vec::new();
    if let Some(key) = &creds.openai_api_key {
        slots.push(Slot {
            backend: Backend::Chat {
                provider: Provider::OpenAi,
                api_key: Some(key.clone()),
            },
            model: OPENAI_MODEL.into(),
            count: config.openai_participant_size,
        });
    }

    let openrouter_key = creds.openrouter_api_key.as_deref();
    if let Some(key) = &creds.anthropic_api_key {
        slots.push(Slot {
            backend: Backend::Anthropic {
                api_key: key.clone(),
            },
            model: ANTHROPIC_MODEL.into(),
            count: config.anthropic_participant_size,
        });
    } else if let Some(key) = openrouter_key {
        slots.push(Slot {
            backend: openrouter(key),
            model: OPENROUTER_ANTHROPIC_MODEL.into(),
            count: config.anthropic_participant_size,
        });
    }

    if let Some(key) = &creds.gemini_api_key {
        slots.push(Slot {
            backend: Backend::Gemini {
                api_key: key.clone(),
            },
            model: GEMINI_MODEL.into(),
            count: config.gemini_participant_size,
        });
    } else if let Some(key) = openrouter_key {
        slots.push(Slot {
            backend: openrouter(key),
            model: OPENROUTER_GEMINI_MODEL.into(),
            count: config.gemini_participant_size,
        });
    }

    if let Some((host, model)) = creds.ollama() {
        slots.push(Slot {
            backend: Backend::Chat {
                provider: Provider::Ollama {
                    host: host.to_string(),
                },
                api_key: None,
            },
            model: model.to_string(),
            count: config.ollama_participant_size,
        });
    }
    if let Some(key) = &creds.deepseek_api_key {
        slots.push(Slot {
            backend: Backend::Chat {
                provider: Provider::DeepSeek,
                api_key: Some(key.clone()),
            },
            model: DEEPSEEK_MODEL.into(),
            count: config.deepseek_participant_size,
        });
    }
    slots
}

/// Assemble the roster described by `config` from the providers `creds`
/// unlocks. Fails with [`Error::EmptyRoster`] when nobody qualifies.
pub fn build_roster(
    config: &ConversationConfig,
    creds: &EnvCredentials,
) -> Result<Vec<SharedAgent>, Error> {
    let mut roster: Vec<SharedAgent> = Vec::new();
    for slot in slots(config, creds) {
        if slot.count == 0 {
            debug!(
                "Skipping {} ({}): no participants requested",
                slot.backend.label(),
                slot.model
            );
            continue;
        }
        for _ in 0..slot.count {
            let name = format!("User {}", roster.len() + 1);
            let agent = slot
                .backend
                .build(&name, &slot.model)
                .map_err(|cause| Error::AgentSetup {
                    agent: name.clone(),
                    cause,
                })?;
            roster.push(agent);
        }
    }

    if roster.is_empty() {
        return Err(Error::EmptyRoster);
    }
    info!(
        "Roster: {}",
        roster
            .iter()
            .map(|a| a.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(roster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn creds(pairs: &[(&str, &str)]) -> EnvCredentials {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvCredentials::from_lookup(|key| map.get(key).cloned())
    }

    fn names(roster: &[SharedAgent]) -> Vec<String> {
        roster.iter().map(|a| a.name().to_string()).collect()
    }

    #[test]
    fn no_credentials_means_empty_roster() {
        let result = build_roster(&ConversationConfig::default(), &creds(&[]));
        assert!(matches!(result, Err(Error::EmptyRoster)));
    }

    #[test]
    fn blank_values_count_as_absent() {
        let c = creds(&[("OPENAI_API_KEY", "  "), ("OLLAMA_HOST", "http://h")]);
        assert!(c.openai_api_key.is_none());
        assert!(c.ollama().is_none());
    }

    #[test]
    fn participants_are_numbered_across_providers_in_order() {
        let config = ConversationConfig::default()
            .with_openai_participants(1)
            .with_anthropic_participants(1)
            .with_gemini_participants(1)
            .with_ollama_participants(1)
            .with_deepseek_participants(2);
        let c = creds(&[
            ("OPENAI_API_KEY", "sk-1"),
            ("OPENROUTER_API_KEY", "or-1"),
            ("OLLAMA_HOST", "http://localhost:11434"),
            ("OLLAMA_MODEL", "llama3"),
            ("DEEPSEEK_API_KEY", "ds-1"),
        ]);
        let roster = build_roster(&config, &c).unwrap();
        assert_eq!(
            names(&roster),
            vec![
                "User 1 (gpt-4)",
                "User 2 (anthropic/claude-3.5-sonnet)",
                "User 3 (google/gemini-flash-1.5)",
                "User 4 (llama3)",
                "User 5 (deepseek-chat)",
                "User 6 (deepseek-chat)",
            ]
        );
        assert_eq!(roster[4].profile().context_window_tokens, 64_000);
    }

    #[test]
    fn native_keys_take_precedence_over_openrouter() {
        let config = ConversationConfig::default()
            .with_openai_participants(0)
            .with_anthropic_participants(1)
            .with_gemini_participants(1)
            .with_ollama_participants(0)
            .with_deepseek_participants(0);
        let c = creds(&[
            ("ANTHROPIC_API_KEY", "ant-1"),
            ("GEMINI_API_KEY", "gem-1"),
            ("OPENROUTER_API_KEY", "or-1"),
        ]);
        let roster = build_roster(&config, &c).unwrap();
        assert_eq!(
            names(&roster),
            vec![
                "User 1 (claude-3-5-sonnet-20240620)",
                "User 2 (gemini-1.5-flash)"
            ]
        );
    }

    #[test]
    fn openrouter_fills_in_for_a_missing_native_key() {
        let config = ConversationConfig::default()
            .with_openai_participants(0)
            .with_anthropic_participants(1)
            .with_gemini_participants(1)
            .with_ollama_participants(0)
            .with_deepseek_participants(0);
        let c = creds(&[("GEMINI_API_KEY", "gem-1"), ("OPENROUTER_API_KEY", "or-1")]);
        let roster = build_roster(&config, &c).unwrap();
        assert_eq!(
            names(&roster),
            vec![
                "User 1 (anthropic/claude-3.5-sonnet)",
                "User 2 (gemini-1.5-flash)"
            ]
        );
    }

    #[test]
    fn providers_without_credentials_are_skipped() {
        let config = ConversationConfig::server_default();
        let c = creds(&[("DEEPSEEK_API_KEY", "ds"), ("OPENAI_API_KEY", "sk")]);
        let roster = build_roster(&config, &c).unwrap();
        // server_default asks for DeepSeek only.
        assert_eq!(roster.len(), 5);
        assert!(roster.iter().all(|a| a.name().ends_with("(deepseek-chat)")));
        assert_eq!(roster[0].name(), "User 1 (deepseek-chat)");
    }

    #[test]
    fn env_file_supplies_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# provider keys\nANTHROPIC_API_KEY=ant-1\nGEMINI_API_KEY=\"gem-1\"\nOPENAI_API_KEY=\n",
        )
        .unwrap();

        let c = EnvCredentials::from_env_file(&path).unwrap();
        assert_eq!(c.anthropic_api_key.as_deref(), Some("ant-1"));
        assert_eq!(c.gemini_api_key.as_deref(), Some("gem-1"));
        assert!(c.openai_api_key.is_none());

        let config = ConversationConfig::default()
            .with_openai_participants(1)
            .with_anthropic_participants(1)
            .with_gemini_participants(0);
        let roster = build_roster(&config, &c).unwrap();
        assert_eq!(names(&roster), vec!["User 1 (claude-3-5-sonnet-20240620)"]);
    }

    #[test]
    fn missing_env_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EnvCredentials::from_env_file(dir.path().join("absent.env")).is_err());
    }

    #[test]
    fn debug_output_redacts_keys() {
        let c = creds(&[("OPENAI_API_KEY", "sk-secret"), ("ANTHROPIC_API_KEY", "ant-secret")]);
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(!dbg.contains("ant-secret"));
        assert!(dbg.contains("<set>"));
    }
}
