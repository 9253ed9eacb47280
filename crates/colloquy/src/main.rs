//! Run a conversation in the terminal.
//!
//! Participants come from `config.json` (created with defaults on first run)
//! and whichever provider credentials are set in the environment. A `.env`
//! file in the working directory is loaded first.
//!
//! # Examples
//!
//! ```sh
//! # One DeepSeek and one OpenAI participant, five turns
//! DEEPSEEK_API_KEY=... OPENAI_API_KEY=... colloquy
//!
//! # Longer run with a custom opening
//! colloquy --turns 20 --prompt "A debate between %d participants about tabs vs spaces."
//!
//! # Credentials from a specific file
//! colloquy --env-file secrets.env
//!
//! # Local models only
//! OLLAMA_HOST=http://localhost:11434 OLLAMA_MODEL=llama3 colloquy --config local.json
//! ```
//!
//! Press Ctrl-C to stop now; the pending turn is discarded.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use colloquy::prelude::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Run a round-robin conversation between LLM participants.
#[derive(Parser)]
#[command(name = "colloquy")]
struct Cli {
    /// Config file; created with defaults if missing
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Number of turns (overrides the config file)
    #[arg(long)]
    turns: Option<usize>,

    /// Opening instruction; `%d` becomes the participant count
    #[arg(long)]
    prompt: Option<String>,

    /// Read provider credentials from this file instead of the environment
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = ConversationConfig::load_or_create(&cli.config).map_err(|e| e.to_string())?;
    if let Some(turns) = cli.turns {
        config = config.with_turns(turns);
    }
    if let Some(prompt) = cli.prompt {
        config = config.with_prompt(prompt);
    }

    let creds = match &cli.env_file {
        Some(path) => EnvCredentials::from_env_file(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?,
        None => EnvCredentials::from_env(),
    };
    let roster = build_roster(&config, &creds).map_err(|e| match e {
        Error::EmptyRoster => "No participants available. Set at least one of OPENAI_API_KEY, \
             ANTHROPIC_API_KEY, GEMINI_API_KEY, DEEPSEEK_API_KEY, OPENROUTER_API_KEY, \
             or OLLAMA_HOST + OLLAMA_MODEL."
            .to_string(),
        other => other.to_string(),
    })?;

    let colors: HashMap<String, Color> = roster
        .iter()
        .enumerate()
        .map(|(i, agent)| (agent.name().to_string(), color_for(i)))
        .collect();
    let prompt = config.rendered_prompt(roster.len());
    let mut conversation = Conversation::new(roster).map_err(|e| e.to_string())?;

    let hub = HistoryHub::new(HubConfig::default().with_buffer_capacity(config.hub_buffer));
    let mut live = hub.subscribe(false).map_err(|e| e.to_string())?;
    let printer = tokio::spawn(async move {
        while let Some(message) = live.recv().await {
            let color = if message.is_system() {
                SYSTEM_COLOR
            } else {
                colors.get(&message.from).copied().unwrap_or(SYSTEM_COLOR)
            };
            println!("{}\n", format_line(&message, color));
        }
    });

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted, stopping now; the pending turn is discarded.");
                cancel.cancel();
            }
        });
    }

    let report = run_conversation(&mut conversation, &hub, prompt, config.turns, &cancel)
        .await
        .map_err(|e| e.to_string());

    // Closing the hub ends the printer once it has drained.
    hub.shutdown();
    let _ = printer.await;

    let report = report?;
    eprintln!("--- {} ---", report.summary());
    if report.is_success() {
        Ok(())
    } else {
        Err(report.summary())
    }
}
