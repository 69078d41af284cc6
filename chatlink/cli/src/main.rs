//! Chatlink - Terminal Chat Client
//!
//! Line-oriented front end for `chatlink-core`. Every line typed on stdin is
//! sent as a chat message; lines starting with `/` are commands. Replies and
//! connection notices are written to stdout, logs to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Connect to the default endpoint (ws://localhost:8765)
//! chatlink
//!
//! # Custom endpoint and config file
//! chatlink --endpoint wss://chat.example.com/ws --config ./client.toml
//!
//! # Verbose logging
//! RUST_LOG=chatlink_core=debug chatlink
//! ```
//!
//! # Commands
//!
//! `/stats`, `/connect`, `/reconnect`, `/disconnect`, `/ping`, `/quit`

mod input;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncWriteExt;
use tracing::info;

use chatlink_core::{load_config, load_config_from_path, ConfigOverrides, ConnectionManager};

use input::{spawn_line_reader, Input, HELP};
use render::{send_notice, system, Renderer};

/// Chatlink - resilient terminal chat client
#[derive(Parser, Debug)]
#[command(name = "chatlink")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Chat server endpoint (ws:// or wss://)
    #[arg(short = 'e', long, value_name = "URL")]
    endpoint: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "CHATLINK_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Handshake timeout in milliseconds
    #[arg(long, value_name = "MS")]
    connect_timeout_ms: Option<u64>,

    /// Automatic reconnection attempts before giving up
    #[arg(long, value_name = "N")]
    reconnect_attempts: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CHATLINK_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging on stderr so stdout stays the chat surface
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("chatlink_core={level},chatlink={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = match args.config.as_deref() {
        Some(path) => load_config_from_path(Some(path))
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => load_config().context("Failed to load config")?,
    };
    config.apply_overrides(&ConfigOverrides {
        endpoint: args.endpoint,
        connect_timeout_ms: args.connect_timeout_ms,
        reconnect_attempts: args.reconnect_attempts,
    });
    config.validate().context("Invalid configuration")?;

    info!(
        endpoint = %config.endpoint,
        source = %config.source,
        "Chatlink starting"
    );

    let mut renderer = Renderer::new(config.reconnect_attempts);
    let manager = ConnectionManager::websocket(config);
    let mut events = manager.subscribe();
    manager.connect();

    let mut lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()))
        .context("Failed to start stdin reader")?;
    let mut stdout = tokio::io::stdout();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let output = tokio::select! {
            Some(event) = events.recv() => renderer.render(&event),
            line = lines.recv() => {
                let Some(line) = line else {
                    info!("End of input");
                    break;
                };
                let line = line.context("Failed to read stdin")?;
                match Input::parse(&line) {
                    Input::Quit => break,
                    input => handle_input(&manager, input).await?,
                }
            }
            _ = &mut ctrl_c => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
        };

        if !output.is_empty() {
            stdout.write_all(output.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    manager.shutdown().await;
    info!("Chatlink stopped");
    Ok(())
}

/// Act on one line of input; returns text to print
async fn handle_input(manager: &ConnectionManager, input: Input) -> Result<String> {
    let output = match input {
        Input::Chat(text) if text.trim().is_empty() => String::new(),
        Input::Chat(text) => {
            let queued_before = manager.stats().queued_messages;
            let sent = manager.send(text).await;
            send_notice(sent, queued_before, manager.stats().queued_messages)
        }
        Input::Stats => {
            let json = serde_json::to_string_pretty(&manager.stats())?;
            format!("{json}\n")
        }
        Input::Connect => {
            manager.connect();
            String::new()
        }
        Input::Reconnect => {
            manager.reconnect();
            String::new()
        }
        Input::Disconnect => {
            manager.disconnect();
            String::new()
        }
        Input::Ping => {
            if manager.ping().await {
                system("ping sent")
            } else {
                system("not connected")
            }
        }
        Input::Help => system(HELP),
        Input::Unknown(command) => system(&format!("unknown command {command}; {HELP}")),
        Input::Quit => String::new(),
    };
    Ok(output)
}
