//! Stream Session
//!
//! Binds one response body to one [`StreamDecoder`] and one
//! [`MessageAccumulator`] for a single outstanding request. Nothing is shared
//! between sessions.
//!
//! Chunks are read one at a time and every payload in a chunk is dispatched
//! before the next read is awaited, so fragments render strictly in arrival
//! order. The session ends when the body is exhausted, a `complete` envelope
//! arrives, an error terminates it, or its [`CancelHandle`] fires. The body
//! is dropped on every one of those paths.

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::watch;

use super::accumulator::{AccumulatorState, MessageAccumulator};
use super::decoder::StreamDecoder;
use super::envelope::{PayloadFormat, StreamEnvelope};
use crate::error::{ClientError, ClientResult};
use crate::messages::SessionId;

/// Response body as a stream of byte chunks
pub type ByteStream = BoxStream<'static, ClientResult<Vec<u8>>>;

/// Receives the effects of a running stream
///
/// Any `FnMut(&str)` is a sink that only renders.
pub trait StreamSink {
    /// Re-render the reply with the full accumulated text
    fn on_render(&mut self, full_text: &str);

    /// The server assigned a session id
    fn on_session_id(&mut self, session_id: &SessionId) {
        let _ = session_id;
    }
}

impl<F> StreamSink for F
where
    F: FnMut(&str),
{
    fn on_render(&mut self, full_text: &str) {
        self(full_text);
    }
}

/// How a finished stream ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Final reply text
    pub text: String,
    /// Content fragments received
    pub fragments: usize,
    /// Whether the server sent an explicit `complete` envelope
    pub server_completed: bool,
}

impl StreamOutcome {
    /// Whether the reply has no content at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Cancels one [`StreamSession`]
///
/// A handle can be created before the response arrives, so a request still
/// waiting for headers can be cancelled too. Dropping the handle does not
/// cancel the session.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Create a handle that has not fired
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Stop the session; its body is dropped at the next await point
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`cancel`](Self::cancel) was called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Future that resolves once [`cancel`](Self::cancel) is called
    ///
    /// It does not borrow the handle, and never resolves if the handle is
    /// dropped without firing.
    pub fn cancelled(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move { cancelled(&mut rx).await }
    }
}

enum Flow {
    Continue,
    Stop,
}

/// One streamed reply
pub struct StreamSession {
    body: Option<ByteStream>,
    decoder: StreamDecoder,
    accumulator: MessageAccumulator,
    format: PayloadFormat,
    cancel_rx: watch::Receiver<bool>,
}

impl StreamSession {
    /// Wrap a response body
    #[must_use]
    pub fn new(body: ByteStream, format: PayloadFormat) -> (Self, CancelHandle) {
        let cancel = CancelHandle::new();
        let session = Self::with_cancel(body, format, &cancel);
        (session, cancel)
    }

    /// Wrap a response body, cancelled by an existing handle
    #[must_use]
    pub fn with_cancel(body: ByteStream, format: PayloadFormat, cancel: &CancelHandle) -> Self {
        Self {
            body: Some(body),
            decoder: StreamDecoder::new(),
            accumulator: MessageAccumulator::new(),
            format,
            cancel_rx: cancel.tx.subscribe(),
        }
    }

    /// Text accumulated so far
    #[must_use]
    pub fn accumulated_text(&self) -> &str {
        self.accumulator.text()
    }

    /// Whether the stream finished normally
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.accumulator.state() == AccumulatorState::Complete
    }

    /// Whether the response body is still held
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.body.is_some()
    }

    /// Drive the stream to its end, rendering into `sink`
    ///
    /// # Errors
    ///
    /// - [`ClientError::Decode`] for invalid UTF-8 or a malformed envelope
    /// - [`ClientError::Stream`] when the server sends an `error` envelope
    /// - [`ClientError::Network`] when the body fails mid-read
    /// - [`ClientError::Cancelled`] when the cancel handle fires
    /// - [`ClientError::InvalidTransition`] if the session already ran
    pub async fn run<S: StreamSink>(&mut self, sink: &mut S) -> ClientResult<StreamOutcome> {
        let Some(mut body) = self.body.take() else {
            return Err(ClientError::InvalidTransition("stream session already ran"));
        };
        let mut cancel_rx = self.cancel_rx.clone();

        let result = self.pump(&mut body, &mut cancel_rx, sink).await;
        drop(body);

        match result {
            Ok(server_completed) => {
                let text = self.accumulator.finalize()?;
                tracing::debug!(
                    fragments = self.accumulator.fragment_count(),
                    chars = text.chars().count(),
                    bytes = self.decoder.bytes_seen(),
                    server_completed,
                    "Stream complete"
                );
                Ok(StreamOutcome {
                    text,
                    fragments: self.accumulator.fragment_count(),
                    server_completed,
                })
            }
            Err(e) => {
                self.accumulator.fail();
                match &e {
                    ClientError::Cancelled => tracing::info!(
                        fragments = self.accumulator.fragment_count(),
                        "Stream cancelled"
                    ),
                    _ => tracing::error!(
                        error = %e,
                        fragments = self.accumulator.fragment_count(),
                        "Stream failed"
                    ),
                }
                Err(e)
            }
        }
    }

    /// Read and dispatch until the stream ends; `Ok(true)` on a `complete` envelope
    async fn pump<S: StreamSink>(
        &mut self,
        body: &mut ByteStream,
        cancel_rx: &mut watch::Receiver<bool>,
        sink: &mut S,
    ) -> ClientResult<bool> {
        loop {
            let chunk = tokio::select! {
                biased;
                () = cancelled(cancel_rx) => return Err(ClientError::Cancelled),
                chunk = body.next() => chunk,
            };

            let Some(chunk) = chunk else { break };
            let chunk = chunk?;
            tracing::trace!(bytes = chunk.len(), "Stream chunk");

            for payload in self.decoder.feed(&chunk)? {
                if let Flow::Stop = self.dispatch(&payload, sink)? {
                    return Ok(true);
                }
            }
        }

        if let Some(payload) = self.decoder.finish()? {
            if let Flow::Stop = self.dispatch(&payload, sink)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn dispatch<S: StreamSink>(&mut self, payload: &str, sink: &mut S) -> ClientResult<Flow> {
        match self.format.interpret(payload)? {
            StreamEnvelope::SessionInfo { session_id } => {
                tracing::debug!(session_id = %session_id, "Session assigned");
                sink.on_session_id(&session_id);
            }
            StreamEnvelope::Content { content } => {
                let text = self.accumulator.append(&content)?;
                if !content.is_empty() {
                    sink.on_render(text);
                }
            }
            StreamEnvelope::Complete { .. } => return Ok(Flow::Stop),
            StreamEnvelope::Error { message } => return Err(ClientError::Stream(message)),
            StreamEnvelope::Unknown { kind } => {
                tracing::debug!(kind = %kind, "Ignoring unknown stream envelope");
            }
        }
        Ok(Flow::Continue)
    }
}

/// Resolves once cancellation is requested; never resolves if the handle is gone
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use pretty_assertions::assert_eq;

    fn body(chunks: &[&[u8]]) -> ByteStream {
        let chunks: Vec<ClientResult<Vec<u8>>> = chunks.iter().map(|c| Ok(c.to_vec())).collect();
        stream::iter(chunks).boxed()
    }

    #[derive(Default)]
    struct Recorder {
        renders: Vec<String>,
        session: Option<String>,
    }

    impl StreamSink for Recorder {
        fn on_render(&mut self, full_text: &str) {
            self.renders.push(full_text.to_string());
        }

        fn on_session_id(&mut self, session_id: &SessionId) {
            self.session = Some(session_id.to_string());
        }
    }

    #[tokio::test]
    async fn test_envelope_stream_renders_incrementally() {
        let (mut session, _cancel) = StreamSession::new(
            body(&[
                b"data: {\"type\":\"session_info\",\"session_id\":7}\n\n",
                b"data: {\"type\":\"content\",\"content\":\"Hi\"}\n\ndata: {\"type\":\"con",
                b"tent\",\"content\":\" there\"}\n\n",
                b"data: {\"type\":\"content\",\"content\":\"!\"}\n\n",
                b"data: {\"type\":\"complete\"}\n\n",
                b"data: {\"type\":\"content\",\"content\":\"ignored\"}\n\n",
            ]),
            PayloadFormat::Envelope,
        );

        let mut sink = Recorder::default();
        let outcome = session.run(&mut sink).await.unwrap();

        assert_eq!(sink.renders, vec!["Hi", "Hi there", "Hi there!"]);
        assert_eq!(sink.session.as_deref(), Some("7"));
        assert_eq!(
            outcome,
            StreamOutcome {
                text: "Hi there!".into(),
                fragments: 3,
                server_completed: true,
            }
        );
        assert!(session.is_complete());
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_raw_stream_ends_with_body() {
        let (mut session, _cancel) = StreamSession::new(
            body(&[b"data: Hel", b"lo\n\ndata:  world\n\n", b"data: !"]),
            PayloadFormat::Raw,
        );

        let mut renders = Vec::new();
        let outcome = session
            .run(&mut |text: &str| renders.push(text.to_string()))
            .await
            .unwrap();

        assert_eq!(renders, vec!["Hello", "Hello world", "Hello world!"]);
        assert_eq!(outcome.text, "Hello world!");
        assert!(!outcome.server_completed);
    }

    #[tokio::test]
    async fn test_error_envelope_terminates() {
        let (mut session, _cancel) = StreamSession::new(
            body(&[
                b"data: {\"type\":\"content\",\"content\":\"part\"}\n\n",
                b"data: {\"type\":\"error\",\"error\":\"model crashed\"}\n\n",
            ]),
            PayloadFormat::Envelope,
        );

        let mut sink = Recorder::default();
        let err = session.run(&mut sink).await.unwrap_err();
        assert!(matches!(err, ClientError::Stream(ref m) if m == "model crashed"));
        assert_eq!(sink.renders, vec!["part"]);
        assert_eq!(session.accumulated_text(), "part");
        assert!(!session.is_complete());
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_decode_failure() {
        let (mut session, _cancel) =
            StreamSession::new(body(&[b"data: {oops\n\n"]), PayloadFormat::Envelope);
        let err = session.run(&mut Recorder::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_decode_failure() {
        let (mut session, _cancel) =
            StreamSession::new(body(&[b"data: \xc3\x28\n\n"]), PayloadFormat::Raw);
        let err = session.run(&mut Recorder::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[tokio::test]
    async fn test_network_error_mid_stream() {
        let chunks: Vec<ClientResult<Vec<u8>>> = vec![
            Ok(b"data: a\n\n".to_vec()),
            Err(ClientError::Network("connection reset".into())),
        ];
        let (mut session, _cancel) =
            StreamSession::new(stream::iter(chunks).boxed(), PayloadFormat::Raw);
        let err = session.run(&mut Recorder::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
    }

    #[tokio::test]
    async fn test_cancel_drops_pending_body() {
        let (mut session, cancel) = StreamSession::new(
            stream::pending::<ClientResult<Vec<u8>>>().boxed(),
            PayloadFormat::Raw,
        );
        cancel.cancel();
        assert!(cancel.is_cancelled());

        let err = session.run(&mut Recorder::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_handle_fired_before_session_exists() {
        let cancel = CancelHandle::new();
        let signal = cancel.cancelled();
        cancel.cancel();
        signal.await;

        let mut session = StreamSession::with_cancel(
            stream::pending::<ClientResult<Vec<u8>>>().boxed(),
            PayloadFormat::Raw,
            &cancel,
        );
        let err = session.run(&mut Recorder::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let (mut session, cancel) = StreamSession::new(body(&[b"data: ok\n"]), PayloadFormat::Raw);
        drop(cancel);
        let outcome = session.run(&mut Recorder::default()).await.unwrap();
        assert_eq!(outcome.text, "ok");
    }

    #[tokio::test]
    async fn test_zero_fragment_stream() {
        let (mut session, _cancel) = StreamSession::new(
            body(&[b"data: {\"type\":\"complete\"}\n\n"]),
            PayloadFormat::Envelope,
        );
        let mut sink = Recorder::default();
        let outcome = session.run(&mut sink).await.unwrap();
        assert!(outcome.is_empty());
        assert_eq!(outcome.fragments, 0);
        assert!(sink.renders.is_empty());
    }

    #[tokio::test]
    async fn test_session_runs_once() {
        let (mut session, _cancel) = StreamSession::new(body(&[]), PayloadFormat::Raw);
        session.run(&mut Recorder::default()).await.unwrap();
        assert!(matches!(
            session.run(&mut Recorder::default()).await,
            Err(ClientError::InvalidTransition(_))
        ));
    }
}
