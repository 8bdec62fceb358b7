//! Stream Decoder
//!
//! Turns raw response-body chunks into `data: ` payloads.
//!
//! Decoding is stateful on two levels:
//! - UTF-8: a multi-byte character split across chunk boundaries is held
//!   back until the rest of it arrives.
//! - Lines: a `data: ` line split across chunks is buffered until its
//!   newline arrives.
//!
//! Invalid UTF-8 is fatal to the stream and never retried.

use crate::error::{ClientError, ClientResult};

/// SSE data line prefix
pub const DATA_PREFIX: &str = "data: ";

/// Strip the `data: ` prefix from a line carrying it
///
/// Only the prefix is removed. Text without the prefix comes back unchanged,
/// so stripping already-stripped text is a no-op.
#[must_use]
pub fn strip_data_prefix(line: &str) -> &str {
    line.strip_prefix(DATA_PREFIX).unwrap_or(line)
}

/// Stateful chunk decoder for one response body
#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Bytes of an incomplete UTF-8 sequence carried to the next chunk
    pending: Vec<u8>,
    /// Text of an unterminated line
    line: String,
    /// Total bytes seen
    bytes_seen: usize,
}

impl StreamDecoder {
    /// Fresh decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes fed so far
    #[must_use]
    pub fn bytes_seen(&self) -> usize {
        self.bytes_seen
    }

    /// Decode a chunk to text, carrying an incomplete trailing character
    ///
    /// An empty chunk yields an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] on an invalid UTF-8 sequence.
    pub fn decode_text(&mut self, chunk: &[u8]) -> ClientResult<String> {
        self.bytes_seen += chunk.len();
        self.pending.extend_from_slice(chunk);

        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_owned();
                self.pending.clear();
                Ok(text)
            }
            Err(e) if e.error_len().is_some() => Err(ClientError::Decode(format!(
                "invalid UTF-8 at byte {}",
                self.bytes_seen - self.pending.len() + e.valid_up_to()
            ))),
            Err(e) => {
                // Incomplete sequence at the end: keep it for the next chunk
                let tail = self.pending.split_off(e.valid_up_to());
                let head = std::mem::replace(&mut self.pending, tail);
                String::from_utf8(head).map_err(|e| ClientError::Decode(e.to_string()))
            }
        }
    }

    /// Feed a chunk and return the payloads of every completed `data: ` line
    ///
    /// Blank lines and non-data lines (`event:`, `id:`, `:` comments) yield
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] on an invalid UTF-8 sequence.
    pub fn feed(&mut self, chunk: &[u8]) -> ClientResult<Vec<String>> {
        let text = self.decode_text(chunk)?;
        self.line.push_str(&text);

        let mut payloads = Vec::new();
        while let Some(pos) = self.line.find('\n') {
            let rest = self.line.split_off(pos + 1);
            let line = std::mem::replace(&mut self.line, rest);
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload.to_owned());
            }
        }
        Ok(payloads)
    }

    /// End of body: flush a trailing unterminated line
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if the body ended inside a multi-byte
    /// character.
    pub fn finish(&mut self) -> ClientResult<Option<String>> {
        if !self.pending.is_empty() {
            let truncated = self.pending.len();
            self.pending.clear();
            return Err(ClientError::Decode(format!(
                "stream ended inside a UTF-8 sequence ({truncated} trailing bytes)"
            )));
        }
        let line = std::mem::take(&mut self.line);
        Ok(data_payload(&line).map(str::to_owned))
    }
}

/// Payload of a `data: ` line, without its line terminator
fn data_payload(line: &str) -> Option<&str> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.strip_prefix(DATA_PREFIX)
}
