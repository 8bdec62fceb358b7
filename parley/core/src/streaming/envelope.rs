//! Stream Envelopes
//!
//! The `single` chat endpoint wraps every payload in a JSON envelope:
//!
//! ```text
//! data: {"type": "session_info", "session_id": 42}
//! data: {"type": "content", "content": "Hi"}
//! data: {"type": "complete", "full_response": "Hi there!"}
//! data: {"type": "error", "error": "model not found"}
//! ```
//!
//! Older servers send the same information without the `type` tag:
//! `{"content": ...}`, `{"done": true}` and `{"error": ...}`. Both shapes are
//! accepted. The `simple` endpoint sends raw text, where every payload is a
//! content fragment.

use serde_json::Value;

use crate::error::{ClientError, ClientResult};
use crate::messages::SessionId;

/// One decoded stream payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEnvelope {
    /// The server assigned a session id
    SessionInfo {
        /// Session id as the server sent it
        session_id: SessionId,
    },
    /// A text fragment to append
    Content {
        /// Fragment text
        content: String,
    },
    /// The stream is complete
    Complete {
        /// Full response as the server saw it, when reported
        full_response: Option<String>,
    },
    /// The server failed mid-stream
    Error {
        /// Server-provided description
        message: String,
    },
    /// A tagged envelope of a type this client does not know; ignored
    Unknown {
        /// The unrecognized `type` value
        kind: String,
    },
}

/// How payloads on a stream are interpreted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Each payload is a raw text fragment
    Raw,
    /// Each payload is a JSON envelope
    #[default]
    Envelope,
}

impl PayloadFormat {
    /// Interpret one payload
    ///
    /// # Errors
    ///
    /// In [`PayloadFormat::Envelope`], returns [`ClientError::Decode`] when the
    /// payload is not a JSON object or lacks the fields its type requires.
    pub fn interpret(self, payload: &str) -> ClientResult<StreamEnvelope> {
        match self {
            Self::Raw => Ok(StreamEnvelope::Content {
                content: payload.to_owned(),
            }),
            Self::Envelope => parse_envelope(payload),
        }
    }
}

/// Parse a JSON envelope, tagged or legacy
///
/// # Errors
///
/// Returns [`ClientError::Decode`] for malformed JSON, non-object payloads and
/// envelopes missing a required field.
pub fn parse_envelope(payload: &str) -> ClientResult<StreamEnvelope> {
    let value: Value = serde_json::from_str(payload)?;
    let Value::Object(map) = value else {
        return Err(ClientError::Decode(format!(
            "stream envelope is not an object: {payload}"
        )));
    };

    match map.get("type").and_then(Value::as_str) {
        Some("session_info") => {
            let session_id = map
                .get("session_id")
                .and_then(SessionId::from_json)
                .ok_or_else(|| missing("session_info", "session_id"))?;
            Ok(StreamEnvelope::SessionInfo { session_id })
        }
        Some("content") => {
            let content = map
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| missing("content", "content"))?;
            Ok(StreamEnvelope::Content {
                content: content.to_owned(),
            })
        }
        Some("complete") => Ok(StreamEnvelope::Complete {
            full_response: map
                .get("full_response")
                .and_then(Value::as_str)
                .map(str::to_owned),
        }),
        Some("error") => Ok(StreamEnvelope::Error {
            message: error_text(map.get("error")),
        }),
        Some(other) => Ok(StreamEnvelope::Unknown {
            kind: other.to_owned(),
        }),
        None => parse_legacy(&map, payload),
    }
}

fn parse_legacy(map: &serde_json::Map<String, Value>, payload: &str) -> ClientResult<StreamEnvelope> {
    if let Some(error) = map.get("error") {
        return Ok(StreamEnvelope::Error {
            message: error_text(Some(error)),
        });
    }
    if let Some(content) = map.get("content").and_then(Value::as_str) {
        return Ok(StreamEnvelope::Content {
            content: content.to_owned(),
        });
    }
    if map.get("done").and_then(Value::as_bool) == Some(true) {
        return Ok(StreamEnvelope::Complete {
            full_response: None,
        });
    }
    if let Some(session_id) = map.get("session_id").and_then(SessionId::from_json) {
        return Ok(StreamEnvelope::SessionInfo { session_id });
    }
    Err(ClientError::Decode(format!(
        "unrecognized stream envelope: {payload}"
    )))
}

fn error_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "unknown server error".to_string(),
        Some(other) => other.to_string(),
    }
}

fn missing(kind: &str, field: &str) -> ClientError {
    ClientError::Decode(format!("'{kind}' envelope without '{field}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tagged_envelopes() {
        assert_eq!(
            parse_envelope(r#"{"type":"session_info","session_id":42}"#).unwrap(),
            StreamEnvelope::SessionInfo {
                session_id: SessionId::from(42)
            }
        );
        assert_eq!(
            parse_envelope(r#"{"type":"session_info","session_id":"abc"}"#).unwrap(),
            StreamEnvelope::SessionInfo {
                session_id: SessionId::from("abc")
            }
        );
        assert_eq!(
            parse_envelope(r#"{"type":"content","content":"Hi"}"#).unwrap(),
            StreamEnvelope::Content {
                content: "Hi".into()
            }
        );
        assert_eq!(
            parse_envelope(r#"{"type":"complete","full_response":"Hi!"}"#).unwrap(),
            StreamEnvelope::Complete {
                full_response: Some("Hi!".into())
            }
        );
        assert_eq!(
            parse_envelope(r#"{"type":"error","error":"boom"}"#).unwrap(),
            StreamEnvelope::Error {
                message: "boom".into()
            }
        );
    }

    #[test]
    fn test_legacy_envelopes() {
        assert_eq!(
            parse_envelope(r#"{"content":"x"}"#).unwrap(),
            StreamEnvelope::Content {
                content: "x".into()
            }
        );
        assert_eq!(
            parse_envelope(r#"{"done":true}"#).unwrap(),
            StreamEnvelope::Complete {
                full_response: None
            }
        );
        assert_eq!(
            parse_envelope(r#"{"error":{"code":500}}"#).unwrap(),
            StreamEnvelope::Error {
                message: r#"{"code":500}"#.into()
            }
        );
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        assert_eq!(
            parse_envelope(r#"{"type":"usage","tokens":12}"#).unwrap(),
            StreamEnvelope::Unknown {
                kind: "usage".into()
            }
        );
    }

    #[test]
    fn test_malformed_envelopes_rejected() {
        for payload in [
            "not json",
            "[1,2]",
            r#"{"type":"content"}"#,
            r#"{"done":false}"#,
            r#"{"type":"session_info","session_id":null}"#,
        ] {
            assert!(
                matches!(parse_envelope(payload), Err(ClientError::Decode(_))),
                "{payload} should be rejected"
            );
        }
    }

    #[test]
    fn test_raw_format_passes_text_through() {
        assert_eq!(
            PayloadFormat::Raw.interpret("{\"type\":\"content\"}").unwrap(),
            StreamEnvelope::Content {
                content: "{\"type\":\"content\"}".into()
            }
        );
    }
}
