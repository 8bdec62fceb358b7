//! Chat Backend Traits
//!
//! The client core talks to its backend only through [`ChatApi`]. The shipped
//! implementation is [`HttpApi`](super::http::HttpApi); tests use
//! [`MockApi`](super::mock::MockApi).
//!
//! # Design Philosophy
//!
//! Implementations return raw results. Deciding what the user sees (inline
//! error messages, alerts, status lines) is the job of the
//! [`ChatApp`](crate::app::ChatApp), so every implementation fails the same way.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ChatEndpoint;
use crate::conversation::ImageAttachment;
use crate::dashboard::UserStats;
use crate::error::{ClientError, ClientResult};
use crate::messages::SessionId;
use crate::recording::AudioPayload;
use crate::status::ServiceStatusMap;
use crate::streaming::{ByteStream, PayloadFormat};

/// One chat turn sent to the backend
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatRequest {
    /// The user's message, already trimmed
    pub message: String,
    /// Model identifier
    pub model: Option<String>,
    /// Provider identifier
    pub provider: Option<String>,
    /// Session id from an earlier `session_info` envelope
    pub session_id: Option<SessionId>,
}

impl ChatRequest {
    /// Create a request for a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the provider
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Continue a server session
    #[must_use]
    pub fn with_session_id(mut self, session_id: Option<SessionId>) -> Self {
        self.session_id = session_id;
        self
    }

    /// JSON body for an endpoint
    ///
    /// The `simple` endpoint takes only the message. The session id is sent
    /// back in the JSON form the server issued it in.
    #[must_use]
    pub fn body(&self, endpoint: ChatEndpoint) -> Value {
        match endpoint {
            ChatEndpoint::Simple => json!({ "message": self.message }),
            ChatEndpoint::Single => json!({
                "message": self.message,
                "model": self.model,
                "provider": self.provider,
                "session_id": self.session_id.as_ref().map(SessionId::to_json),
            }),
        }
    }
}

/// Result of probing the transcription endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranscriberProbe {
    /// The endpoint rejected an empty upload with 400, as a live one does
    Available,
    /// Any other HTTP status
    Responded(u16),
}

/// A model offered by the local Ollama server
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ModelInfo {
    /// Model tag, e.g. `llama3:8b`
    pub name: String,
    /// Size on disk in bytes
    #[serde(default)]
    pub size: Option<u64>,
}

/// Body of `GET /api/tags`
#[derive(Debug, Default, Deserialize)]
pub struct ModelsResponse {
    /// Installed models
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

/// Body of `POST /api/image/generate`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ImageResponse {
    /// Whether generation succeeded
    #[serde(default)]
    pub success: bool,
    /// Base64 PNG images
    #[serde(default)]
    pub images: Option<Vec<String>>,
    /// Cost in dollars
    #[serde(default)]
    pub cost: Option<f64>,
    /// Server-side error, if reported
    #[serde(default)]
    pub error: Option<String>,
}

impl ImageResponse {
    /// First image of a successful response
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Stream`] when the server reports failure or no
    /// images, and [`ClientError::Decode`] for an undecodable image.
    pub fn into_attachment(self, prompt: &str) -> ClientResult<ImageAttachment> {
        let Self {
            success,
            images,
            cost,
            error,
        } = self;
        let first = images
            .filter(|_| success)
            .and_then(|images| images.into_iter().next());
        match first {
            Some(data) => ImageAttachment::from_base64(&data, prompt, cost.unwrap_or(0.0)),
            None => Err(ClientError::Stream(
                error.unwrap_or_else(|| "image generation returned no image".to_string()),
            )),
        }
    }
}

/// Extract the transcript from a `/api/audio/transcribe` body
///
/// `transcription` may be a string or an object with a `text` field. A
/// missing or empty transcript is a failure.
///
/// # Errors
///
/// Returns [`ClientError::Stream`] when no transcript is present.
pub fn parse_transcription(body: &Value) -> ClientResult<String> {
    let text = match body.get("transcription") {
        Some(Value::String(text)) => Some(text.as_str()),
        Some(Value::Object(obj)) => obj.get("text").and_then(Value::as_str),
        _ => None,
    };
    match text.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_owned()),
        _ => Err(ClientError::Stream(
            body.get("error")
                .and_then(Value::as_str)
                .unwrap_or("transcription failed")
                .to_owned(),
        )),
    }
}

/// Chat backend
///
/// Implement this trait to put the client in front of another transport.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// How payloads on chat streams are encoded
    fn payload_format(&self) -> PayloadFormat;

    /// Send a chat turn and return the response body
    ///
    /// A non-success HTTP status is a [`ClientError::Network`].
    async fn open_chat_stream(&self, request: &ChatRequest) -> ClientResult<ByteStream>;

    /// Fetch the current service availability
    async fn service_status(&self) -> ClientResult<ServiceStatusMap>;

    /// Transcribe recorded audio
    async fn transcribe(&self, audio: AudioPayload) -> ClientResult<String>;

    /// Generate an image for a prompt
    async fn generate_image(&self, prompt: &str) -> ClientResult<ImageAttachment>;

    /// Usage figures for the dashboard
    async fn user_stats(&self) -> ClientResult<UserStats> {
        Err(ClientError::Unsupported("user stats"))
    }

    /// Check whether the transcriber is up
    async fn probe_transcriber(&self) -> ClientResult<TranscriberProbe> {
        Err(ClientError::Unsupported("transcriber probe"))
    }

    /// List models installed on the Ollama server
    async fn list_models(&self) -> ClientResult<Vec<ModelInfo>> {
        Err(ClientError::Unsupported("model listing"))
    }
}
