//! Parley - Terminal Chat Client
//!
//! Terminal surface for the parley client core. Talks to a chat backend,
//! streams replies into the transcript, and shows backend service health.
//!
//! # Usage
//!
//! ```bash
//! # Interactive chat against the default server (http://localhost:8000)
//! parley
//!
//! # Another server, raw-text endpoint
//! parley --server http://gpu-box:8000 --endpoint simple
//!
//! # One-shot commands
//! parley status
//! parley models
//! parley probe
//! parley stats
//!
//! # Verbose logging (written to stderr)
//! RUST_LOG=debug parley
//! ```
//!
//! # Chat Commands
//!
//! - `/text`, `/audio`, `/image` (or `/1`, `/2`, `/3`): switch input mode
//! - `/record`: start recording, or stop and transcribe
//! - `/cancel`: stop the reply being streamed
//! - `/clear`: reset the conversation
//! - `/quit`: exit

mod commands;
mod repl;
mod surface;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use parley_core::config::{self, ChatEndpoint, ClientConfig, ConfigOverrides};
use parley_core::HttpApi;

/// Parley - streaming chat client for a personal LLM assistant
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Chat server base URL
    #[arg(short = 's', long, value_name = "URL")]
    server: Option<String>,

    /// Chat endpoint flavor (simple or single)
    #[arg(short = 'e', long, value_name = "ENDPOINT")]
    endpoint: Option<ChatEndpoint>,

    /// Model sent with each message
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Provider sent with each message
    #[arg(short = 'p', long)]
    provider: Option<String>,

    /// Service status poll interval in seconds
    #[arg(long, value_name = "SECS")]
    poll_interval: Option<u64>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "PARLEY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Audio file played back as the microphone by /record
    #[arg(long, value_name = "FILE", default_value = "recording.wav")]
    audio_file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "PARLEY_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

/// What to run
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Interactive chat (default)
    Chat,
    /// Print backend service status once
    Status,
    /// List models installed on the Ollama server
    Models,
    /// Check whether the transcriber is up
    Probe,
    /// Show usage figures and the budget
    Stats,
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so they never interleave with the transcript.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("parley={level},parley_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve configuration: defaults, file, environment, then flags
fn resolve_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => config::load_config_from_path(Some(path.clone()))
            .with_context(|| format!("Failed to load config: {path:?}"))?,
        None => config::load_config().context("Failed to load config")?,
    };

    let mut overrides = ConfigOverrides::new();
    if let Some(url) = &args.server {
        overrides = overrides.with_base_url(url.clone());
    }
    if let Some(endpoint) = args.endpoint {
        overrides = overrides.with_endpoint(endpoint);
    }
    if let Some(model) = &args.model {
        overrides = overrides.with_model(model.clone());
    }
    if let Some(provider) = &args.provider {
        overrides = overrides.with_provider(provider.clone());
    }
    if let Some(secs) = args.poll_interval {
        overrides = overrides.with_poll_interval_secs(secs);
    }
    overrides.apply(&mut config);

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = resolve_config(&args)?;
    info!(
        server = %config.base_url,
        endpoint = ?config.endpoint,
        source = %config.source(),
        "Configuration loaded"
    );

    let api = Arc::new(HttpApi::from_config(&config).context("Failed to create HTTP client")?);

    match args.command.unwrap_or(Command::Chat) {
        Command::Chat => repl::run(api, &config, args.audio_file).await,
        Command::Status => commands::status(api.as_ref()).await,
        Command::Models => commands::models(api.as_ref()).await,
        Command::Probe => commands::probe(api.as_ref()).await,
        Command::Stats => commands::stats(api.as_ref()).await,
    }
}
