//! Chat Application Context
//!
//! [`ChatApp`] is the one object a surface talks to. It is constructed once at
//! startup and owns everything a chat session needs: the conversation, the
//! input mode, the recorder, the server session id and the busy guard.
//!
//! # Design Philosophy
//!
//! The app never renders. Every visible effect is a [`UiMessage`] pushed down
//! the surface channel, so a terminal, a web page or a test harness all see
//! the same sequence.
//!
//! ```text
//!   surface ──submit()──► ChatApp ──open_chat_stream()──► ChatApi
//!      ▲                     │
//!      │                StreamSession
//!      │                     │ on_render(full_text)
//!      └──── UiMessage ◄─────┘
//! ```
//!
//! Methods take `&self`, so an `Arc<ChatApp>` can run a turn on one task while
//! another cancels it. Only one turn runs at a time; a second submission gets
//! [`ClientError::Busy`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::api::{ChatApi, ChatRequest, ModelInfo, TranscriberProbe};
use crate::config::ClientConfig;
use crate::conversation::{ChatMessage, Conversation};
use crate::dashboard::UserStats;
use crate::error::{ClientError, ClientResult};
use crate::messages::{MessageId, SessionId, UiMessage};
use crate::mode::{InputField, Mode, ModeController, SubmitRoute};
use crate::recording::{AudioSource, Recorder, Recording, IDLE_STATUS};
use crate::streaming::{CancelHandle, StreamSession, StreamSink};

/// First message of every conversation
pub const WELCOME_MESSAGE: &str = "Hello! I'm your personal assistant. How can I help you today?";

/// Loading text while a chat reply streams
pub const CHAT_LOADING: &str = "Processing response...";

/// Loading text while an image is generated
pub const IMAGE_LOADING: &str = "Generating image... This may take a few minutes.";

/// Assistant message appended when a chat turn fails
pub const CHAT_FAILURE: &str = "Sorry, an error occurred while processing your message.";

/// Assistant message appended when image generation fails
pub const IMAGE_FAILURE: &str =
    "Sorry, the image could not be generated. Check that the Stable Diffusion service is running.";

/// Alert shown when the audio input is refused
pub const MICROPHONE_DENIED: &str = "Could not access the microphone. Check the permissions.";

const RECORDING_ACTIVE: &str = "Recording... Click to stop";
const RECORDING_PROCESSING: &str = "Processing audio...";
const TRANSCRIPTION_DONE: &str = "Transcription complete!";
const TRANSCRIPTION_FAILED: &str = "Transcription error";
const TRANSCRIPTION_DONE_FOR: Duration = Duration::from_secs(5);
const TRANSCRIPTION_FAILED_FOR: Duration = Duration::from_secs(3);

/// What a submission did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing to send; no request was issued
    Ignored,
    /// A streamed reply was added and finalized
    Replied(MessageId),
    /// The stream finished without any content, so no reply was shown
    NoReply,
    /// A generated image was added
    ImageAdded(MessageId),
    /// The turn failed and this fallback message was added
    Failed(MessageId),
    /// The stream was cancelled; any partial reply was kept
    Cancelled,
}

/// Marks a turn in flight. Dropping it ends the turn on every path,
/// including a dropped future.
struct TurnGuard<'a> {
    app: &'a ChatApp,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.app.active_stream.lock().take();
        self.app.emit(UiMessage::Loading { text: None });
        self.app.busy.store(false, Ordering::Release);
    }
}

/// Renders a streamed reply into the conversation
///
/// The assistant message is created on the first render and updated in place
/// afterwards.
struct ReplySink<'a> {
    app: &'a ChatApp,
    message_id: Option<MessageId>,
}

impl StreamSink for ReplySink<'_> {
    fn on_render(&mut self, full_text: &str) {
        match &self.message_id {
            None => {
                let message = ChatMessage::assistant_streaming(full_text);
                let id = self.app.conversation.lock().push(message.clone());
                self.app.emit(UiMessage::MessageAdded { message });
                self.message_id = Some(id);
            }
            Some(id) => {
                if let Err(e) = self.app.conversation.lock().update_content(id, full_text) {
                    tracing::warn!(id = %id, error = %e, "Dropping update for missing reply");
                    return;
                }
                self.app.emit(UiMessage::MessageUpdated {
                    id: id.clone(),
                    content: full_text.to_string(),
                });
            }
        }
    }

    fn on_session_id(&mut self, session_id: &SessionId) {
        *self.app.session_id.lock() = Some(session_id.clone());
        self.app.emit(UiMessage::SessionChanged {
            session_id: Some(session_id.clone()),
        });
    }
}

/// The chat application context
pub struct ChatApp {
    api: Arc<dyn ChatApi>,
    model: String,
    provider: String,
    conversation: Mutex<Conversation>,
    mode: Mutex<ModeController>,
    recorder: tokio::sync::Mutex<Recorder>,
    session_id: Mutex<Option<SessionId>>,
    busy: AtomicBool,
    active_stream: Mutex<Option<CancelHandle>>,
    tx: mpsc::UnboundedSender<UiMessage>,
}

impl ChatApp {
    /// Create an app with default model and provider
    pub fn new(
        api: Arc<dyn ChatApi>,
        audio: Arc<dyn AudioSource>,
        tx: mpsc::UnboundedSender<UiMessage>,
    ) -> Self {
        Self::from_config(api, audio, &ClientConfig::default(), tx)
    }

    /// Create an app using the model and provider from `config`
    pub fn from_config(
        api: Arc<dyn ChatApi>,
        audio: Arc<dyn AudioSource>,
        config: &ClientConfig,
        tx: mpsc::UnboundedSender<UiMessage>,
    ) -> Self {
        tracing::info!(
            backend = api.name(),
            model = %config.model,
            provider = %config.provider,
            "Chat app ready"
        );
        Self {
            api,
            model: config.model.clone(),
            provider: config.provider.clone(),
            conversation: Mutex::new(Conversation::new(WELCOME_MESSAGE)),
            mode: Mutex::new(ModeController::new()),
            recorder: tokio::sync::Mutex::new(Recorder::new(audio)),
            session_id: Mutex::new(None),
            busy: AtomicBool::new(false),
            active_stream: Mutex::new(None),
            tx,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Backend shared with other components, such as the status poller
    #[must_use]
    pub fn api(&self) -> Arc<dyn ChatApi> {
        Arc::clone(&self.api)
    }

    /// Snapshot of the conversation
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.conversation.lock().messages().to_vec()
    }

    /// The conversation as a standalone HTML page
    #[must_use]
    pub fn transcript_html(&self) -> String {
        self.conversation.lock().to_html()
    }

    /// Active input mode
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode.lock().current()
    }

    /// Server session id, once assigned
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id.lock().clone()
    }

    /// Whether a chat turn or image request is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Whether audio is being captured
    pub async fn is_recording(&self) -> bool {
        self.recorder.lock().await.is_recording()
    }

    fn emit(&self, msg: UiMessage) {
        if let Err(e) = self.tx.send(msg) {
            tracing::warn!("Failed to send message to surface: {}", e);
        }
    }

    fn begin_turn(&self) -> ClientResult<TurnGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Rejecting submission while a turn is in flight");
            return Err(ClientError::Busy);
        }
        Ok(TurnGuard { app: self })
    }

    /// Trimmed input, or [`ClientError::EmptyInput`] when nothing is left
    fn submitted_text(input: &str) -> ClientResult<&str> {
        let text = input.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyInput);
        }
        Ok(text)
    }

    fn append(&self, message: ChatMessage) -> MessageId {
        let id = self.conversation.lock().push(message.clone());
        self.emit(UiMessage::MessageAdded { message });
        id
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Submit the input of the active mode
    ///
    /// `input` is the content of the field the mode validates: the image
    /// prompt in image mode, the message otherwise. The route is chosen
    /// before the input is looked at.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Busy`] while another turn is in flight. Request
    /// and stream failures are not errors: they add a fallback message and
    /// return [`SubmitOutcome::Failed`].
    pub async fn submit(&self, input: &str) -> ClientResult<SubmitOutcome> {
        let route = self.mode.lock().route_submit();
        match route {
            SubmitRoute::Image => self.generate_image(input).await,
            SubmitRoute::Chat => self.send_message(input).await,
        }
    }

    /// Send a chat message and stream the reply
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Busy`] while another turn is in flight.
    pub async fn send_message(&self, input: &str) -> ClientResult<SubmitOutcome> {
        let Ok(message) = Self::submitted_text(input) else {
            tracing::debug!("Ignoring empty message");
            return Ok(SubmitOutcome::Ignored);
        };
        let _turn = self.begin_turn()?;

        self.append(ChatMessage::user(message));
        self.emit(UiMessage::InputCleared {
            field: InputField::Message,
        });
        self.emit(UiMessage::Loading {
            text: Some(CHAT_LOADING.to_string()),
        });

        let request = ChatRequest::new(message)
            .with_model(self.model.as_str())
            .with_provider(self.provider.as_str())
            .with_session_id(self.session_id());

        let mut sink = ReplySink {
            app: self,
            message_id: None,
        };
        let result = self.stream_reply(&request, &mut sink).await;
        let reply = sink.message_id.take();

        if let Some(id) = &reply {
            if self.conversation.lock().finalize(id).is_ok() {
                self.emit(UiMessage::MessageFinalized { id: id.clone() });
            }
        }

        match result {
            Ok(()) => Ok(match reply {
                Some(id) => SubmitOutcome::Replied(id),
                None => {
                    tracing::debug!("Stream ended without content; no reply shown");
                    SubmitOutcome::NoReply
                }
            }),
            Err(ClientError::Cancelled) => Ok(SubmitOutcome::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "Chat turn failed");
                Ok(SubmitOutcome::Failed(self.append(ChatMessage::assistant(CHAT_FAILURE))))
            }
        }
    }

    async fn stream_reply(&self, request: &ChatRequest, sink: &mut ReplySink<'_>) -> ClientResult<()> {
        // Installed before the request so a turn waiting for headers can be cancelled.
        let cancel = CancelHandle::new();
        let cancelled = cancel.cancelled();
        *self.active_stream.lock() = Some(cancel);

        let body = tokio::select! {
            biased;
            () = cancelled => {
                tracing::info!("Chat request cancelled before the reply started");
                return Err(ClientError::Cancelled);
            }
            body = self.api.open_chat_stream(request) => body?,
        };

        let mut session = {
            let active = self.active_stream.lock();
            let cancel = active.as_ref().ok_or(ClientError::Cancelled)?;
            StreamSession::with_cancel(body, self.api.payload_format(), cancel)
        };
        session.run(sink).await.map(|_| ())
    }

    /// Request an image for a prompt
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Busy`] while another turn is in flight.
    pub async fn generate_image(&self, input: &str) -> ClientResult<SubmitOutcome> {
        let Ok(prompt) = Self::submitted_text(input) else {
            tracing::debug!("Ignoring empty image prompt");
            return Ok(SubmitOutcome::Ignored);
        };
        let _turn = self.begin_turn()?;

        self.append(ChatMessage::user(format!("🎨 Generate image: \"{prompt}\"")));
        self.emit(UiMessage::InputCleared {
            field: InputField::ImagePrompt,
        });
        self.emit(UiMessage::Loading {
            text: Some(IMAGE_LOADING.to_string()),
        });

        match self.api.generate_image(prompt).await {
            Ok(image) => {
                tracing::info!(bytes = image.png.len(), cost = image.cost, "Image generated");
                Ok(SubmitOutcome::ImageAdded(self.append(ChatMessage::assistant_image(image))))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Image generation failed");
                Ok(SubmitOutcome::Failed(self.append(ChatMessage::assistant(IMAGE_FAILURE))))
            }
        }
    }

    /// Cancel the streaming reply, if any
    ///
    /// Returns whether a stream was running.
    pub fn cancel_stream(&self) -> bool {
        match self.active_stream.lock().as_ref() {
            Some(handle) => {
                handle.cancel();
                tracing::info!("Cancelling active stream");
                true
            }
            None => false,
        }
    }

    /// Reset to the welcome message and forget the server session
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Busy`] while a turn is in flight.
    pub fn clear_chat(&self) -> ClientResult<()> {
        if self.is_busy() {
            return Err(ClientError::Busy);
        }
        self.conversation.lock().clear();
        self.session_id.lock().take();
        self.emit(UiMessage::ConversationCleared);
        self.emit(UiMessage::SessionChanged { session_id: None });
        tracing::debug!("Conversation cleared");
        Ok(())
    }

    // ========================================================================
    // Mode
    // ========================================================================

    /// Switch the input mode; returns whether it changed
    pub fn set_mode(&self, mode: Mode) -> bool {
        let view = self.mode.lock().set_mode(mode);
        match view {
            Some(view) => {
                self.emit(UiMessage::ModeChanged { view });
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Recording
    // ========================================================================

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::PermissionDenied`] when the input is refused,
    /// after alerting the surface.
    pub async fn start_recording(&self) -> ClientResult<()> {
        let mut recorder = self.recorder.lock().await;
        if recorder.is_recording() {
            return Ok(());
        }
        if let Err(e) = recorder.start_recording().await {
            tracing::warn!(error = %e, "Audio input unavailable");
            if matches!(e, ClientError::PermissionDenied(_)) {
                self.emit(UiMessage::Alert {
                    message: MICROPHONE_DENIED.to_string(),
                });
            }
            return Err(e);
        }
        self.emit(UiMessage::Recording { active: true });
        self.emit(UiMessage::RecordingStatus {
            text: RECORDING_ACTIVE.to_string(),
            revert_after: None,
        });
        Ok(())
    }

    /// Stop capturing and return what was recorded
    ///
    /// Does nothing and returns `Ok(None)` when not recording.
    ///
    /// # Errors
    ///
    /// Propagates read failures from the audio input. The input is released
    /// either way.
    pub async fn stop_recording(&self) -> ClientResult<Option<Recording>> {
        let result = self.recorder.lock().await.stop_recording().await;
        match &result {
            Ok(None) => return result,
            Ok(Some(_)) => {
                self.emit(UiMessage::Recording { active: false });
                self.emit(UiMessage::RecordingStatus {
                    text: RECORDING_PROCESSING.to_string(),
                    revert_after: None,
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Recording failed");
                self.emit(UiMessage::Recording { active: false });
                self.transcription_status(TRANSCRIPTION_FAILED, TRANSCRIPTION_FAILED_FOR);
            }
        }
        result
    }

    /// Transcribe a recording into the message field
    ///
    /// An empty recording issues no request and returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns the transcriber's error after showing the failure status.
    pub async fn process_recording(&self, recording: Recording) -> ClientResult<Option<String>> {
        if recording.is_empty() {
            tracing::debug!("Empty recording; nothing to transcribe");
            self.emit(UiMessage::RecordingStatus {
                text: IDLE_STATUS.to_string(),
                revert_after: None,
            });
            return Ok(None);
        }

        let payload = recording.into_payload();
        tracing::debug!(bytes = payload.bytes.len(), "Transcribing recording");
        match self.api.transcribe(payload).await {
            Ok(text) => {
                self.emit(UiMessage::InputFilled {
                    field: InputField::Message,
                    text: text.clone(),
                });
                self.transcription_status(TRANSCRIPTION_DONE, TRANSCRIPTION_DONE_FOR);
                Ok(Some(text))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Transcription failed");
                self.transcription_status(TRANSCRIPTION_FAILED, TRANSCRIPTION_FAILED_FOR);
                Err(e)
            }
        }
    }

    /// Start recording, or stop and transcribe
    ///
    /// Returns the transcript when a recording was stopped and transcribed.
    ///
    /// # Errors
    ///
    /// See [`start_recording`](Self::start_recording),
    /// [`stop_recording`](Self::stop_recording) and
    /// [`process_recording`](Self::process_recording).
    pub async fn toggle_recording(&self) -> ClientResult<Option<String>> {
        if self.is_recording().await {
            match self.stop_recording().await? {
                Some(recording) => self.process_recording(recording).await,
                None => Ok(None),
            }
        } else {
            self.start_recording().await?;
            Ok(None)
        }
    }

    fn transcription_status(&self, text: &str, revert_after: Duration) {
        self.emit(UiMessage::RecordingStatus {
            text: text.to_string(),
            revert_after: Some(revert_after),
        });
    }

    // ========================================================================
    // Dashboard and Diagnostics
    // ========================================================================

    /// Usage figures for the dashboard
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn user_stats(&self) -> ClientResult<UserStats> {
        self.api.user_stats().await
    }

    /// Check whether the transcriber is up
    ///
    /// # Errors
    ///
    /// Propagates connection failures.
    pub async fn probe_transcriber(&self) -> ClientResult<TranscriberProbe> {
        self.api.probe_transcriber().await
    }

    /// Models installed on the Ollama server
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn list_models(&self) -> ClientResult<Vec<ModelInfo>> {
        self.api.list_models().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{envelope_body, MockApi};
    use crate::recording::MemoryAudioSource;
    use crate::messages::Sender;
    use pretty_assertions::assert_eq;

    fn app_with(api: Arc<MockApi>) -> (ChatApp, mpsc::UnboundedReceiver<UiMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = ChatApp::new(api, Arc::new(MemoryAudioSource::default()), tx);
        (app, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<UiMessage>) -> Vec<UiMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_app_starts_with_welcome() {
        let (app, _rx) = app_with(Arc::new(MockApi::new()));
        let messages = app.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, WELCOME_MESSAGE);
        assert_eq!(app.mode(), Mode::Text);
        assert!(!app.is_busy());
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let api = Arc::new(MockApi::new());
        let (app, mut rx) = app_with(api.clone());

        assert_eq!(app.submit("   \n").await.unwrap(), SubmitOutcome::Ignored);
        assert!(api.chat_requests().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_submitted_text_trims_or_rejects() {
        assert_eq!(ChatApp::submitted_text("  hi \n").unwrap(), "hi");
        assert!(matches!(
            ChatApp::submitted_text(" \t"),
            Err(ClientError::EmptyInput)
        ));
    }

    #[tokio::test]
    async fn test_session_id_is_remembered_and_cleared() {
        let api = Arc::new(MockApi::new());
        api.push_chat_chunks(envelope_body(Some("42"), &["one"]));
        api.push_chat_chunks(envelope_body(None, &["two"]));
        let (app, _rx) = app_with(api.clone());

        app.submit("first").await.unwrap();
        assert_eq!(app.session_id(), Some(SessionId::from("42")));
        app.submit("second").await.unwrap();

        let requests = api.chat_requests();
        assert_eq!(requests[0].session_id, None);
        assert_eq!(requests[1].session_id, Some(SessionId::from("42")));
        assert_eq!(requests[1].model.as_deref(), Some("llama3.2"));

        app.clear_chat().unwrap();
        assert_eq!(app.session_id(), None);
        assert_eq!(app.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_fragment_reply_is_suppressed() {
        let api = Arc::new(MockApi::new());
        api.push_chat_chunks(envelope_body(None, &[]));
        let (app, _rx) = app_with(api);

        assert_eq!(app.submit("Hello").await.unwrap(), SubmitOutcome::NoReply);
        let senders: Vec<Sender> = app.messages().iter().map(|m| m.sender).collect();
        assert_eq!(senders, vec![Sender::Assistant, Sender::User]);
    }

    #[tokio::test]
    async fn test_request_failure_adds_one_fallback() {
        let api = Arc::new(MockApi::new());
        api.push_chat_error(ClientError::Network("refused".into()));
        let (app, mut rx) = app_with(api);

        let outcome = app.submit("Hello").await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Failed(_)));

        let messages = app.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content, CHAT_FAILURE);
        assert!(!app.is_busy());

        let last = drain(&mut rx).pop();
        assert!(matches!(last, Some(UiMessage::Loading { text: None })));
    }

    #[tokio::test]
    async fn test_mode_change_emits_once() {
        let (app, mut rx) = app_with(Arc::new(MockApi::new()));
        assert!(app.set_mode(Mode::Audio));
        assert!(!app.set_mode(Mode::Audio));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_clear_while_busy_is_rejected() {
        let (app, _rx) = app_with(Arc::new(MockApi::new()));
        let _turn = app.begin_turn().unwrap();
        assert!(matches!(app.clear_chat(), Err(ClientError::Busy)));
        assert!(matches!(app.begin_turn(), Err(ClientError::Busy)));
    }

    #[tokio::test]
    async fn test_cancel_without_stream() {
        let (app, _rx) = app_with(Arc::new(MockApi::new()));
        assert!(!app.cancel_stream());
    }
}
