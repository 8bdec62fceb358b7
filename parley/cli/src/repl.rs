//! Interactive chat loop
//!
//! Reads lines from stdin and drives a [`ChatApp`]. Chat turns run on their
//! own tasks so `/cancel` and Ctrl+C can reach a streaming reply.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use parley_core::recording::FileAudioSource;
use parley_core::status::StatusPoller;
use parley_core::{ChatApi, ChatApp, ClientConfig, ClientError, Mode, ServiceStatusMap};

use crate::surface::{self, TerminalSurface};

const HELP: &str =
    "commands: /text /audio /image (or /1 /2 /3), /record, /cancel, /clear, /save [file], /quit";

/// Where `/save` writes when no file is given
const DEFAULT_TRANSCRIPT: &str = "transcript.html";

/// One line of input
#[derive(Clone, Debug, PartialEq, Eq)]
enum ReplCommand {
    Quit,
    Help,
    SetMode(Mode),
    Record,
    Cancel,
    Clear,
    Save(PathBuf),
    Unknown(String),
    Submit(String),
}

impl ReplCommand {
    fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(command) = trimmed.strip_prefix('/') else {
            return Self::Submit(line.to_string());
        };
        let (name, arg) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(name, arg)| (name, arg.trim()));
        match name {
            "quit" | "exit" | "q" => Self::Quit,
            "help" | "?" => Self::Help,
            "record" | "rec" => Self::Record,
            "cancel" => Self::Cancel,
            "clear" => Self::Clear,
            "save" if arg.is_empty() => Self::Save(PathBuf::from(DEFAULT_TRANSCRIPT)),
            "save" => Self::Save(PathBuf::from(arg)),
            other => {
                let mode = other
                    .chars()
                    .next()
                    .filter(|_| other.len() == 1)
                    .and_then(Mode::from_shortcut)
                    .or_else(|| other.parse().ok());
                mode.map_or_else(|| Self::Unknown(trimmed.to_string()), Self::SetMode)
            }
        }
    }
}

fn spawn_submit(app: &Arc<ChatApp>, text: String) {
    let app = Arc::clone(app);
    tokio::spawn(async move {
        match app.submit(&text).await {
            Ok(outcome) => tracing::debug!(?outcome, "Submission finished"),
            Err(ClientError::Busy) => surface::notice("(still answering, /cancel to stop it)"),
            Err(e) => tracing::warn!(error = %e, "Submission failed"),
        }
    });
}

/// Run the chat loop until `/quit` or end of input
pub async fn run(api: Arc<dyn ChatApi>, config: &ClientConfig, audio_file: PathBuf) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let audio = Arc::new(FileAudioSource::new(audio_file, config.chunk_size));
    let app = Arc::new(ChatApp::from_config(Arc::clone(&api), audio, config, tx));

    let surface = TerminalSurface::new(std::env::temp_dir());
    for message in app.messages() {
        surface.print_message(&message);
    }
    surface::notice(HELP);
    let surface_task = tokio::spawn(surface.run(rx));

    let poller = Arc::new(StatusPoller::new(api));
    let mut status_rx = poller.subscribe();
    let poller_handle = Arc::clone(&poller).start(config.poll_interval);
    let status_task = tokio::spawn(async move {
        let mut shown: Option<ServiceStatusMap> = None;
        while status_rx.changed().await.is_ok() {
            let map = status_rx.borrow_and_update().clone();
            if shown.as_ref() != Some(&map) {
                surface::print_services(&map);
                shown = Some(map);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut transcript: Option<String> = None;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => {
                if app.cancel_stream() {
                    continue;
                }
                break;
            }
        };
        let Some(line) = line else { break };

        match ReplCommand::parse(&line) {
            ReplCommand::Quit => break,
            ReplCommand::Help => surface::notice(HELP),
            ReplCommand::SetMode(mode) => {
                if !app.set_mode(mode) {
                    surface::notice(&format!("(already in {mode} mode)"));
                }
            }
            ReplCommand::Record => match app.toggle_recording().await {
                Ok(Some(text)) => transcript = Some(text),
                Ok(None) => {}
                Err(e) => tracing::debug!(error = %e, "Recording toggle failed"),
            },
            ReplCommand::Cancel => {
                if !app.cancel_stream() {
                    surface::notice("(nothing to cancel)");
                }
            }
            ReplCommand::Clear => {
                if app.clear_chat().is_err() {
                    surface::notice("(wait for the reply to finish, or /cancel it)");
                }
            }
            ReplCommand::Save(path) => match tokio::fs::write(&path, app.transcript_html()).await {
                Ok(()) => surface::notice(&format!("(transcript saved to {})", path.display())),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to save transcript");
                    surface::notice(&format!("(could not save {}: {e})", path.display()));
                }
            },
            ReplCommand::Unknown(command) => {
                surface::notice(&format!("unknown command {command}; {HELP}"));
            }
            ReplCommand::Submit(text) => {
                let text = if text.trim().is_empty() {
                    transcript.take().unwrap_or_default()
                } else {
                    transcript = None;
                    text
                };
                spawn_submit(&app, text);
            }
        }
    }

    app.cancel_stream();
    if app.is_recording().await {
        if let Err(e) = app.stop_recording().await {
            tracing::debug!(error = %e, "Recording discarded at exit");
        }
    }
    poller_handle.stop().await;
    status_task.abort();
    drop(app);

    // Pending image requests still hold the app; do not wait on them.
    if tokio::time::timeout(Duration::from_secs(1), surface_task)
        .await
        .is_err()
    {
        tracing::debug!("Surface still busy at exit");
    }
    Ok(())
}
