//! Scripted Backend for Tests
//!
//! [`MockApi`] answers each [`ChatApi`] call from a queue of scripted
//! results and records what it was asked.
//!
//! # Usage
//!
//! ```ignore
//! use parley_core::api::mock::{envelope_body, MockApi};
//!
//! let api = MockApi::new();
//! api.push_chat_chunks(envelope_body(Some("1"), &["Hi", " there"]));
//!
//! // ... drive a ChatApp ...
//!
//! assert_eq!(api.chat_requests()[0].message, "Hello");
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::traits::{ChatApi, ChatRequest, ModelInfo, TranscriberProbe};
use crate::conversation::ImageAttachment;
use crate::dashboard::UserStats;
use crate::error::{ClientError, ClientResult};
use crate::recording::AudioPayload;
use crate::status::ServiceStatusMap;
use crate::streaming::{ByteStream, PayloadFormat};

/// SSE body for the envelope format: optional `session_info`, one `content`
/// envelope per fragment, then `complete`
#[must_use]
pub fn envelope_body(session_id: Option<&str>, fragments: &[&str]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    if let Some(id) = session_id {
        let envelope = serde_json::json!({ "type": "session_info", "session_id": id });
        chunks.push(format!("data: {envelope}\n\n").into_bytes());
    }
    for fragment in fragments {
        let envelope = serde_json::json!({ "type": "content", "content": fragment });
        chunks.push(format!("data: {envelope}\n\n").into_bytes());
    }
    chunks.push(b"data: {\"type\": \"complete\"}\n\n".to_vec());
    chunks
}

/// Releases calls held by [`MockApi::hold_status`] or [`MockApi::hold_chat`]
#[derive(Debug)]
pub struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    /// Let held calls proceed
    pub fn release(&self) {
        self.tx.send_replace(true);
    }
}

/// Scripted [`ChatApi`]
///
/// Calls with nothing scripted fail with [`ClientError::Network`].
pub struct MockApi {
    format: PayloadFormat,
    chats: Mutex<VecDeque<ClientResult<ByteStream>>>,
    statuses: Mutex<VecDeque<ClientResult<ServiceStatusMap>>>,
    transcriptions: Mutex<VecDeque<ClientResult<String>>>,
    images: Mutex<VecDeque<ClientResult<ImageAttachment>>>,
    stats: Mutex<Option<UserStats>>,
    models: Mutex<Option<Vec<ModelInfo>>>,
    status_gate: Mutex<Option<watch::Receiver<bool>>>,
    chat_gate: Mutex<Option<watch::Receiver<bool>>>,

    chat_requests: Mutex<Vec<ChatRequest>>,
    audio_uploads: Mutex<Vec<AudioPayload>>,
    image_prompts: Mutex<Vec<String>>,
    status_calls: AtomicUsize,
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockApi {
    /// Empty script, envelope payloads
    #[must_use]
    pub fn new() -> Self {
        Self::with_format(PayloadFormat::Envelope)
    }

    /// Empty script with a given payload format
    #[must_use]
    pub fn with_format(format: PayloadFormat) -> Self {
        Self {
            format,
            chats: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            transcriptions: Mutex::new(VecDeque::new()),
            images: Mutex::new(VecDeque::new()),
            stats: Mutex::new(None),
            models: Mutex::new(None),
            status_gate: Mutex::new(None),
            chat_gate: Mutex::new(None),
            chat_requests: Mutex::new(Vec::new()),
            audio_uploads: Mutex::new(Vec::new()),
            image_prompts: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
        }
    }

    // ========================================================================
    // Scripting
    // ========================================================================

    /// Next chat turn streams these chunks
    pub fn push_chat_chunks(&self, chunks: Vec<Vec<u8>>) {
        let body = futures::stream::iter(chunks.into_iter().map(Ok)).boxed();
        self.chats.lock().push_back(Ok(body));
    }

    /// Next chat turn streams this body
    pub fn push_chat_stream(&self, body: ByteStream) {
        self.chats.lock().push_back(Ok(body));
    }

    /// Next chat turn fails before streaming
    pub fn push_chat_error(&self, error: ClientError) {
        self.chats.lock().push_back(Err(error));
    }

    /// Next status poll result
    pub fn push_status(&self, result: ClientResult<ServiceStatusMap>) {
        self.statuses.lock().push_back(result);
    }

    /// Next transcription result
    pub fn push_transcription(&self, result: ClientResult<String>) {
        self.transcriptions.lock().push_back(result);
    }

    /// Next image generation result
    pub fn push_image(&self, result: ClientResult<ImageAttachment>) {
        self.images.lock().push_back(result);
    }

    /// Usage figures to report
    pub fn set_user_stats(&self, stats: UserStats) {
        *self.stats.lock() = Some(stats);
    }

    /// Models to report
    pub fn set_models(&self, models: Vec<ModelInfo>) {
        *self.models.lock() = Some(models);
    }

    /// Hold every status call until the returned gate is released
    #[must_use]
    pub fn hold_status(&self) -> Gate {
        let (tx, rx) = watch::channel(false);
        *self.status_gate.lock() = Some(rx);
        Gate { tx }
    }

    /// Hold every chat request before its response arrives until the
    /// returned gate is released
    #[must_use]
    pub fn hold_chat(&self) -> Gate {
        let (tx, rx) = watch::channel(false);
        *self.chat_gate.lock() = Some(rx);
        Gate { tx }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Chat requests received so far
    #[must_use]
    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.chat_requests.lock().clone()
    }

    /// Audio uploads received so far
    #[must_use]
    pub fn audio_uploads(&self) -> Vec<AudioPayload> {
        self.audio_uploads.lock().clone()
    }

    /// Image prompts received so far
    #[must_use]
    pub fn image_prompts(&self) -> Vec<String> {
        self.image_prompts.lock().clone()
    }

    /// Number of status calls
    #[must_use]
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

fn unscripted(what: &str) -> ClientError {
    ClientError::Network(format!("no scripted {what}"))
}

#[async_trait]
impl ChatApi for MockApi {
    fn name(&self) -> &str {
        "mock"
    }

    fn payload_format(&self) -> PayloadFormat {
        self.format
    }

    async fn open_chat_stream(&self, request: &ChatRequest) -> ClientResult<ByteStream> {
        self.chat_requests.lock().push(request.clone());
        let gate = self.chat_gate.lock().clone();
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }
        let next = self.chats.lock().pop_front();
        next.unwrap_or_else(|| Err(unscripted("chat stream")))
    }

    async fn service_status(&self) -> ClientResult<ServiceStatusMap> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.status_gate.lock().clone();
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }
        let next = self.statuses.lock().pop_front();
        next.unwrap_or_else(|| Err(unscripted("status")))
    }

    async fn transcribe(&self, audio: AudioPayload) -> ClientResult<String> {
        self.audio_uploads.lock().push(audio);
        let next = self.transcriptions.lock().pop_front();
        next.unwrap_or_else(|| Err(unscripted("transcription")))
    }

    async fn generate_image(&self, prompt: &str) -> ClientResult<ImageAttachment> {
        self.image_prompts.lock().push(prompt.to_string());
        let next = self.images.lock().pop_front();
        next.unwrap_or_else(|| Err(unscripted("image")))
    }

    async fn user_stats(&self) -> ClientResult<UserStats> {
        self.stats
            .lock()
            .clone()
            .ok_or(ClientError::Unsupported("user stats"))
    }

    async fn probe_transcriber(&self) -> ClientResult<TranscriberProbe> {
        Ok(TranscriberProbe::Available)
    }

    async fn list_models(&self) -> ClientResult<Vec<ModelInfo>> {
        self.models
            .lock()
            .clone()
            .ok_or(ClientError::Unsupported("model listing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_calls_fail() {
        let api = MockApi::new();
        assert!(api.service_status().await.is_err());
        assert!(api.open_chat_stream(&ChatRequest::new("x")).await.is_err());
        assert_eq!(api.status_calls(), 1);
        assert_eq!(api.chat_requests().len(), 1);
    }

    #[test]
    fn test_envelope_body_shape() {
        let chunks = envelope_body(Some("9"), &["a"]);
        assert_eq!(chunks.len(), 3);
        assert!(String::from_utf8_lossy(&chunks[0]).contains("session_info"));
        assert!(String::from_utf8_lossy(&chunks[2]).contains("complete"));
    }
}
