//! Client Error Taxonomy
//!
//! Every failure in the client core maps onto one of a small set of kinds.
//! None of them is retried automatically: each one ends the single operation
//! that raised it, and the user starts over with a new action.
//!
//! | Kind               | Surfaced as                                  |
//! |--------------------|----------------------------------------------|
//! | `Network`          | inline assistant error message               |
//! | `Decode`           | logged, generic assistant failure message    |
//! | `Stream`           | logged, generic assistant failure message    |
//! | `PermissionDenied` | blocking alert, recording not started        |
//! | `EmptyInput`       | ignored, no request issued                   |
//! | `Busy`             | submission rejected while a turn is running  |

use thiserror::Error;

/// Errors raised by the client core
#[derive(Debug, Error)]
pub enum ClientError {
    /// Request rejected, connection dropped, or a non-success HTTP status
    #[error("network failure: {0}")]
    Network(String),

    /// Malformed stream framing, invalid UTF-8 or an unparsable envelope
    #[error("decode failure: {0}")]
    Decode(String),

    /// The server reported an error inside the stream
    #[error("stream error: {0}")]
    Stream(String),

    /// Audio input capability was refused
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No message or prompt to send
    #[error("empty input")]
    EmptyInput,

    /// Another chat turn is still in flight
    #[error("a response is still in progress")]
    Busy,

    /// Operation not valid in the current state
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    /// The active stream was cancelled
    #[error("stream cancelled")]
    Cancelled,

    /// The backend does not offer this operation
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
