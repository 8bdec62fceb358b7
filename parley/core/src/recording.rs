//! Recording Capture
//!
//! Scoped acquisition of an audio input. The input is held only between
//! [`Recorder::start_recording`] and [`Recorder::stop_recording`], inside a
//! [`CaptureGuard`] whose `Drop` releases it on every path, errors included.
//!
//! Audio hardware sits behind [`AudioSource`]. The shipped source,
//! [`FileAudioSource`], replays a prerecorded file in fixed-size chunks;
//! [`MemoryAudioSource`] serves tests.
//!
//! Chunks are delivered when the recording stops, the way a browser media
//! recorder without a timeslice hands over its data.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use crate::error::{ClientError, ClientResult};

/// Status line shown while idle
pub const IDLE_STATUS: &str = "Click to record";

/// Audio upload for the transcriber
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioPayload {
    /// Concatenated audio bytes
    pub bytes: Vec<u8>,
    /// Upload file name
    pub file_name: String,
    /// Upload content type
    pub mime_type: String,
}

impl AudioPayload {
    /// Multipart field carrying the audio
    pub const FIELD: &'static str = "audio";

    /// WAV upload named `recording.wav`
    #[must_use]
    pub fn wav(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: "recording.wav".to_string(),
            mime_type: "audio/wav".to_string(),
        }
    }
}

/// An acquired audio input
#[async_trait]
pub trait AudioCapture: Send {
    /// Next captured chunk, `None` once the input is drained
    async fn next_chunk(&mut self) -> ClientResult<Option<Vec<u8>>>;

    /// Give the input back. Called exactly once, by [`CaptureGuard`].
    fn release(&mut self) {}
}

/// Something that can grant an audio input
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Acquire the input
    ///
    /// Refusal is [`ClientError::PermissionDenied`].
    async fn open(&self) -> ClientResult<Box<dyn AudioCapture>>;
}

/// Holds an audio input and releases it on drop
pub struct CaptureGuard {
    capture: Box<dyn AudioCapture>,
}

impl CaptureGuard {
    /// Take ownership of an acquired input
    #[must_use]
    pub fn new(capture: Box<dyn AudioCapture>) -> Self {
        Self { capture }
    }

    /// Read every remaining chunk
    ///
    /// # Errors
    ///
    /// Propagates read failures from the input.
    pub async fn drain(&mut self) -> ClientResult<Vec<Vec<u8>>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.capture.next_chunk().await? {
            if !chunk.is_empty() {
                chunks.push(chunk);
            }
        }
        Ok(chunks)
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.capture.release();
        tracing::debug!("Audio input released");
    }
}

/// Audio captured between start and stop
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Recording {
    chunks: Vec<Vec<u8>>,
}

impl Recording {
    /// Wrap captured chunks
    #[must_use]
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self { chunks }
    }

    /// Number of chunks
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Whether nothing was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Concatenate the chunks into one upload
    #[must_use]
    pub fn into_payload(self) -> AudioPayload {
        AudioPayload::wav(self.chunks.concat())
    }
}

/// Start/stop state around one audio input at a time
pub struct Recorder {
    source: Arc<dyn AudioSource>,
    active: Option<CaptureGuard>,
}

impl Recorder {
    /// Recorder over an audio source
    pub fn new(source: Arc<dyn AudioSource>) -> Self {
        Self {
            source,
            active: None,
        }
    }

    /// Whether audio is being captured
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Acquire the audio input and start capturing
    ///
    /// Starting while already recording does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::PermissionDenied`] when the input is refused;
    /// recording is not started.
    pub async fn start_recording(&mut self) -> ClientResult<()> {
        if self.is_recording() {
            return Ok(());
        }
        let capture = self.source.open().await?;
        self.active = Some(CaptureGuard::new(capture));
        tracing::info!("Recording started");
        Ok(())
    }

    /// Stop capturing and hand over what was recorded
    ///
    /// Returns `Ok(None)` when not recording. The input is released on every
    /// path, including a failed read.
    ///
    /// # Errors
    ///
    /// Propagates read failures from the input.
    pub async fn stop_recording(&mut self) -> ClientResult<Option<Recording>> {
        let Some(mut guard) = self.active.take() else {
            return Ok(None);
        };
        let chunks = guard.drain().await;
        drop(guard);

        let recording = Recording::new(chunks?);
        tracing::info!(chunks = recording.chunk_count(), "Recording stopped");
        Ok(Some(recording))
    }
}

// ============================================================================
// Audio Sources
// ============================================================================

/// Replays a prerecorded audio file as the captured input
#[derive(Clone, Debug)]
pub struct FileAudioSource {
    path: PathBuf,
    chunk_size: usize,
}

impl FileAudioSource {
    /// Source reading `path` in chunks of `chunk_size` bytes
    pub fn new(path: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            path: path.into(),
            chunk_size: chunk_size.max(1),
        }
    }
}

struct FileCapture {
    file: tokio::fs::File,
    chunk_size: usize,
}

#[async_trait]
impl AudioCapture for FileCapture {
    async fn next_chunk(&mut self) -> ClientResult<Option<Vec<u8>>> {
        let mut buf = vec![0; self.chunk_size];
        let read = self
            .file
            .read(&mut buf)
            .await
            .map_err(|e| ClientError::Decode(format!("audio read failed: {e}")))?;
        if read == 0 {
            return Ok(None);
        }
        buf.truncate(read);
        Ok(Some(buf))
    }
}

#[async_trait]
impl AudioSource for FileAudioSource {
    async fn open(&self) -> ClientResult<Box<dyn AudioCapture>> {
        let file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            ClientError::PermissionDenied(format!(
                "cannot open audio input {}: {e}",
                self.path.display()
            ))
        })?;
        Ok(Box::new(FileCapture {
            file,
            chunk_size: self.chunk_size,
        }))
    }
}

/// In-memory source for tests and demos
///
/// Counts acquisitions and releases so callers can check the input is
/// always given back.
#[derive(Debug, Default)]
pub struct MemoryAudioSource {
    chunks: Vec<Vec<u8>>,
    deny: bool,
    fail_read: bool,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl MemoryAudioSource {
    /// Source that yields these chunks on every recording
    #[must_use]
    pub fn with_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    /// Source that refuses access
    #[must_use]
    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    /// Source whose reads fail after acquisition
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_read: true,
            ..Self::default()
        }
    }

    /// Times the input was acquired
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Times the input was released
    #[must_use]
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

struct MemoryCapture {
    chunks: std::vec::IntoIter<Vec<u8>>,
    fail_read: bool,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl AudioCapture for MemoryCapture {
    async fn next_chunk(&mut self) -> ClientResult<Option<Vec<u8>>> {
        if self.fail_read {
            return Err(ClientError::Decode("audio device disconnected".into()));
        }
        Ok(self.chunks.next())
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioSource for MemoryAudioSource {
    async fn open(&self) -> ClientResult<Box<dyn AudioCapture>> {
        if self.deny {
            return Err(ClientError::PermissionDenied(
                "microphone access refused".into(),
            ));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCapture {
            chunks: self.chunks.clone().into_iter(),
            fail_read: self.fail_read,
            released: Arc::clone(&self.released),
        }))
    }
}
