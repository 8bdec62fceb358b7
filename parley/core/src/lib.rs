//! Parley Core - Headless Streaming Chat Client
//!
//! This crate provides the client side of a personal LLM assistant, completely
//! independent of any UI framework. It sends chat turns to an HTTP backend,
//! renders the streamed reply incrementally, polls backend service health,
//! switches between text, audio and image input, and captures audio for
//! transcription.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        UI Surfaces                           │
//! │        ┌──────────────┐            ┌──────────────────┐      │
//! │        │ Terminal CLI │            │ Tests / Headless │      │
//! │        └──────┬───────┘            └────────┬─────────┘      │
//! │               └──────────────┬──────────────┘                │
//! │                     method calls (up)                        │
//! │                     UiMessage (down)                         │
//! └──────────────────────────────┼───────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┼───────────────────────────────┐
//! │                        PARLEY CORE                           │
//! │  ┌───────────────────────────┴────────────────────────────┐  │
//! │  │                       ChatApp                          │  │
//! │  │  ┌──────────────┐ ┌──────┐ ┌──────────┐ ┌───────────┐  │  │
//! │  │  │ Conversation │ │ Mode │ │ Recorder │ │ Streaming │  │  │
//! │  │  └──────────────┘ └──────┘ └──────────┘ └───────────┘  │  │
//! │  └───────────────────────────┬────────────────────────────┘  │
//! │             StatusPoller     │                               │
//! │                   └──────────┤                               │
//! │                          ChatApi (HttpApi | MockApi)         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use parley_core::{
//!     api::HttpApi, config::load_config, recording::FileAudioSource, ChatApp,
//! };
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let api = Arc::new(HttpApi::from_config(&config)?);
//!     let audio = Arc::new(FileAudioSource::new("take.wav", config.chunk_size));
//!
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let app = ChatApp::from_config(api, audio, &config, tx);
//!
//!     app.submit("Hello").await?;
//!     while let Ok(msg) = rx.try_recv() {
//!         // Render message to UI
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`api`]: Backend abstraction, HTTP implementation and scripted mock
//! - [`app`]: The application context surfaces drive
//! - [`config`]: TOML and environment configuration
//! - [`conversation`]: Message list view model
//! - [`dashboard`]: Usage figures, budget warning, indicator labels
//! - [`markup`]: Basic markdown subset to styled spans
//! - [`messages`]: Messages from the app to UI surfaces
//! - [`mode`]: Exclusive text/audio/image input mode
//! - [`recording`]: Scoped audio capture
//! - [`status`]: Service health polling
//! - [`streaming`]: Stream decoding and incremental accumulation
//!
//! # No Terminal Dependencies
//!
//! This crate has **zero** dependencies on crossterm or any other terminal
//! library. Surfaces live in their own crates.

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod app;
pub mod config;
pub mod conversation;
pub mod dashboard;
pub mod error;
pub mod markup;
pub mod messages;
pub mod mode;
pub mod recording;
pub mod status;
pub mod streaming;

pub use api::{ChatApi, ChatRequest, HttpApi};
pub use app::{ChatApp, SubmitOutcome};
pub use config::{ClientConfig, ConfigError};
pub use conversation::{ChatMessage, Conversation, ImageAttachment};
pub use error::{ClientError, ClientResult};
pub use messages::{MessageId, Sender, SessionId, UiMessage};
pub use mode::{Mode, ModeController};
pub use recording::{AudioPayload, Recorder};
pub use status::{ServiceStatusMap, StatusPoller};
pub use streaming::{StreamDecoder, StreamSession};
