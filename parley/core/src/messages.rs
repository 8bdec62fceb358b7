//! Surface Messages
//!
//! Messages sent from the [`ChatApp`](crate::app::ChatApp) to a UI surface.
//! The surface holds no chat logic of its own: it renders what it is told.
//!
//! # Design Philosophy
//!
//! A streamed assistant reply is announced once with `MessageAdded` and then
//! re-rendered in place with `MessageUpdated`, which always carries the full
//! accumulated text rather than a diff. Surfaces never remove and re-create a
//! message node per fragment.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::ChatMessage;
use crate::mode::{InputField, ModeView};

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("msg_{id}"))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a chat message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The person typing
    User,
    /// The model's reply
    #[serde(alias = "ai")]
    Assistant,
}

impl Sender {
    /// Display label for transcripts
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "you",
            Self::Assistant => "assistant",
        }
    }
}

/// Server session id, kept in the JSON form the server issued it in
///
/// `42` and `"42"` are different ids; each is sent back as it arrived.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionId {
    /// Issued as a JSON number
    Number(serde_json::Number),
    /// Issued as a JSON string
    Text(String),
}

impl SessionId {
    /// Read an id from a JSON value; only numbers and strings qualify
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// The id as the server sent it
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Number(n) => Value::Number(n.clone()),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for SessionId {
    fn from(id: i64) -> Self {
        Self::Number(id.into())
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_owned())
    }
}

/// Messages from the chat app to a UI surface
#[derive(Clone, Debug)]
pub enum UiMessage {
    // ============================================
    // Conversation
    // ============================================
    /// A new message was appended to the conversation
    MessageAdded {
        /// Snapshot of the message at creation time
        message: ChatMessage,
    },

    /// A streaming message changed; re-render the full content
    MessageUpdated {
        /// Message being streamed
        id: MessageId,
        /// Full accumulated content
        content: String,
    },

    /// A streaming message became immutable
    MessageFinalized {
        /// Message that completed
        id: MessageId,
    },

    /// Conversation reset to the welcome message
    ConversationCleared,

    /// The server assigned (or the client forgot) a session id
    SessionChanged {
        /// New session id, `None` after a reset
        session_id: Option<SessionId>,
    },

    // ============================================
    // Input and Mode
    // ============================================
    /// Show (`Some`) or hide (`None`) the loading indicator.
    /// The send affordance is disabled while it is shown.
    Loading {
        /// Loading text
        text: Option<String>,
    },

    /// An input field was emptied after submission
    InputCleared {
        /// Which field
        field: InputField,
    },

    /// An input field was filled by the app (e.g. with a transcript)
    InputFilled {
        /// Which field
        field: InputField,
        /// New value
        text: String,
    },

    /// The exclusive input mode changed
    ModeChanged {
        /// What the surface should show now
        view: ModeView,
    },

    // ============================================
    // Recording
    // ============================================
    /// Recording indicator on or off
    Recording {
        /// Whether audio is being captured
        active: bool,
    },

    /// Recording status line; reverts to the idle text after `revert_after`
    RecordingStatus {
        /// Status text
        text: String,
        /// When set, the surface shows the idle text again after this delay
        revert_after: Option<Duration>,
    },

    // ============================================
    // Notifications
    // ============================================
    /// Blocking alert that the user must acknowledge
    Alert {
        /// Alert text
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_are_unique() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
        assert!(a.0.starts_with("msg_"));
    }

    #[test]
    fn test_sender_accepts_ai_alias() {
        let sender: Sender = serde_json::from_str("\"ai\"").unwrap();
        assert_eq!(sender, Sender::Assistant);
        assert_eq!(serde_json::to_string(&Sender::User).unwrap(), "\"user\"");
    }
}
