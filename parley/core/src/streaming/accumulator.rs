//! Incremental Message Accumulator
//!
//! Owns the text of the reply being streamed. Each fragment is appended to
//! the buffer and the whole buffer is handed back for re-rendering.
//!
//! ```text
//! Idle ──append──▶ Streaming ──finalize──▶ Complete
//!   │                  │
//!   └──────fail────────┴──────fail──────▶ Errored
//! ```
//!
//! Appending after `Complete` or `Errored` is rejected.

use crate::error::{ClientError, ClientResult};

/// Accumulator lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccumulatorState {
    /// No fragment yet
    #[default]
    Idle,
    /// At least one fragment received
    Streaming,
    /// Stream finished normally
    Complete,
    /// Stream ended with an error
    Errored,
}

impl AccumulatorState {
    /// Whether no more fragments are accepted
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Errored)
    }
}

/// Growing text of one streamed reply
#[derive(Debug, Default)]
pub struct MessageAccumulator {
    buffer: String,
    state: AccumulatorState,
    fragments: usize,
}

impl MessageAccumulator {
    /// Empty, idle accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the full text so far
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidTransition`] once the accumulator is
    /// complete or errored.
    pub fn append(&mut self, fragment: &str) -> ClientResult<&str> {
        if self.state.is_terminal() {
            return Err(ClientError::InvalidTransition(
                "append after the stream ended",
            ));
        }
        self.state = AccumulatorState::Streaming;
        self.fragments += 1;
        self.buffer.push_str(fragment);
        Ok(&self.buffer)
    }

    /// Mark the reply complete and return the final text
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidTransition`] if already complete or errored.
    pub fn finalize(&mut self) -> ClientResult<String> {
        if self.state.is_terminal() {
            return Err(ClientError::InvalidTransition("finalize after the stream ended"));
        }
        self.state = AccumulatorState::Complete;
        Ok(self.buffer.clone())
    }

    /// Mark the reply errored. Text received so far is kept.
    pub fn fail(&mut self) {
        if self.state != AccumulatorState::Complete {
            self.state = AccumulatorState::Errored;
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    /// Text accumulated so far
    #[must_use]
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Number of fragments appended
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    /// Whether no fragment was ever appended
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments == 0
    }
}
