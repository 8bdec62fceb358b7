//! Streamed Reply Handling
//!
//! Everything between a chat response body and the text a surface renders.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      StreamSession                          │
//! │                                                            │
//! │  ByteStream ──▶ StreamDecoder ──▶ PayloadFormat ──▶ ...     │
//! │  (chunks)       (UTF-8, lines)    (raw | envelope)          │
//! │                                                            │
//! │      ... ──▶ MessageAccumulator ──▶ StreamSink::on_render   │
//! │              (full text)            (every fragment)        │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both chat endpoints share the same decoder and accumulator. They differ
//! only in [`PayloadFormat`].

pub mod accumulator;
pub mod decoder;
pub mod envelope;
pub mod session;

pub use accumulator::{AccumulatorState, MessageAccumulator};
pub use decoder::{strip_data_prefix, StreamDecoder, DATA_PREFIX};
pub use envelope::{parse_envelope, PayloadFormat, StreamEnvelope};
pub use session::{ByteStream, CancelHandle, StreamOutcome, StreamSession, StreamSink};
