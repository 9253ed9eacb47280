//! Conversation server: configure and start over REST, watch over SSE or
//! WebSocket.
//!
//! # Usage
//!
//! ```bash
//! DEEPSEEK_API_KEY=... cargo run -p colloquy-web
//! DEEPSEEK_API_KEY=... cargo run -p colloquy-web -- --port 9000 --config server.json
//! ```
//!
//! Provider credentials may also live in a `.env` file in the working
//! directory.
//!
//! Then:
//!
//! ```bash
//! curl -N localhost:8080/history/stream &
//! curl -X POST localhost:8080/configure -d '{"turns": 10, "deepseek_participant_size": 3}'
//! curl -X POST localhost:8080/start
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colloquy::config::ConversationConfig;
use colloquy_web::{ConversationSession, WebConfig, spawn_web};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Serve a multi-agent conversation over HTTP.
#[derive(Parser)]
#[command(about = "Serve a multi-agent conversation over HTTP, SSE and WebSocket")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Initial configuration file; created with server defaults if missing.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Bind on all interfaces instead of localhost only.
    #[arg(long)]
    public: bool,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ConversationConfig::load_or_create_with(
        &args.config,
        ConversationConfig::server_default,
    )
    .map_err(|e| e.to_string())?;

    let session = Arc::new(ConversationSession::from_env(config));
    let host = if args.public { [0, 0, 0, 0] } else { [127, 0, 0, 1] };
    let web_config = WebConfig {
        bind_addr: (host, args.port).into(),
        ..Default::default()
    };
    let addr = spawn_web(session.clone(), web_config)
        .await
        .map_err(|e| format!("failed to bind port {}: {e}", args.port))?;
    println!("Conversation server: http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for Ctrl-C: {e}"))?;
    info!("Shutting down");
    session.shutdown();
    Ok(())
}
