//! Conversation View Model
//!
//! The ordered list of chat messages a surface displays. The conversation is
//! owned by the [`ChatApp`](crate::app::ChatApp); nothing else mutates it.
//!
//! A message is mutable only while it is streaming. Once finalized, further
//! updates are rejected.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::markup::{escape_html, format_message, to_html, Span};
use crate::messages::{MessageId, Sender};

/// An image returned by the image-generation service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// Decoded PNG bytes
    pub png: Vec<u8>,
    /// Prompt that produced the image
    pub prompt: String,
    /// Reported cost in dollars
    pub cost: f64,
}

impl ImageAttachment {
    /// Decode a base64 PNG payload
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if the payload is not valid base64.
    pub fn from_base64(data: &str, prompt: impl Into<String>, cost: f64) -> ClientResult<Self> {
        let png = base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| ClientError::Decode(format!("image payload: {e}")))?;
        Ok(Self {
            png,
            prompt: prompt.into(),
            cost,
        })
    }

    /// `data:` URL for surfaces that embed images inline
    #[must_use]
    pub fn data_url(&self) -> String {
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.png)
        )
    }

    /// Caption shown under the image
    #[must_use]
    pub fn caption(&self) -> String {
        format!("Generated image: {}\nCost: ${:.3}", self.prompt, self.cost)
    }
}

/// A message in the conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub sender: Sender,
    /// Message content
    pub content: String,
    /// Whether the content is rendered through [`format_message`]
    pub rendered_as_markup: bool,
    /// Generated image, if any
    pub image: Option<ImageAttachment>,
    /// Whether the message is still being streamed
    pub streaming: bool,
    /// When the message was created (Unix timestamp ms)
    pub timestamp: u64,
}

impl ChatMessage {
    /// A finished user message, shown as typed
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Sender::User, content.into(), false, false)
    }

    /// A finished assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, content.into(), true, false)
    }

    /// An assistant message whose content is still arriving
    pub fn assistant_streaming(content: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, content.into(), true, true)
    }

    /// An assistant message carrying a generated image
    pub fn assistant_image(image: ImageAttachment) -> Self {
        let mut message = Self::new(Sender::Assistant, image.caption(), false, false);
        message.image = Some(image);
        message
    }

    fn new(sender: Sender, content: String, rendered_as_markup: bool, streaming: bool) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            content,
            rendered_as_markup,
            image: None,
            streaming,
            timestamp: now_ms(),
        }
    }

    /// Content split into styled spans (plain text when markup is off)
    #[must_use]
    pub fn spans(&self) -> Vec<Span> {
        if self.rendered_as_markup {
            format_message(&self.content)
        } else {
            vec![Span::plain(self.content.clone())]
        }
    }

    /// One `<div>` per message; generated images are embedded inline
    #[must_use]
    pub fn to_html(&self) -> String {
        let class = match self.sender {
            Sender::User => "user-message",
            Sender::Assistant => "ai-message",
        };
        let mut html = format!("<div class=\"message {class}\">");
        if let Some(image) = &self.image {
            html.push_str(&format!(
                "<img src=\"{}\" alt=\"{}\"><br>",
                image.data_url(),
                escape_html(&image.prompt)
            ));
        }
        html.push_str(&to_html(&self.spans()));
        html.push_str("</div>");
        html
    }
}

/// Ordered chat messages, starting with a welcome message
#[derive(Clone, Debug)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    welcome: ChatMessage,
}

impl Conversation {
    /// Create a conversation showing only the welcome message
    pub fn new(welcome: impl Into<String>) -> Self {
        let welcome = ChatMessage::assistant(welcome);
        Self {
            messages: vec![welcome.clone()],
            welcome,
        }
    }

    /// All messages in display order
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages, welcome included
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether only the welcome message is shown
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.len() <= 1
    }

    /// Look up a message
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Append a message and return its ID
    pub fn push(&mut self, message: ChatMessage) -> MessageId {
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    /// Replace the content of a streaming message
    ///
    /// # Errors
    ///
    /// Rejects unknown IDs and messages that were already finalized.
    pub fn update_content(&mut self, id: &MessageId, content: &str) -> ClientResult<()> {
        let message = self.get_mut(id)?;
        if !message.streaming {
            return Err(ClientError::InvalidTransition("message already finalized"));
        }
        content.clone_into(&mut message.content);
        Ok(())
    }

    /// Mark a streaming message immutable
    ///
    /// # Errors
    ///
    /// Rejects unknown IDs and messages that were already finalized.
    pub fn finalize(&mut self, id: &MessageId) -> ClientResult<()> {
        let message = self.get_mut(id)?;
        if !message.streaming {
            return Err(ClientError::InvalidTransition("message already finalized"));
        }
        message.streaming = false;
        Ok(())
    }

    /// Drop everything except the welcome message
    pub fn clear(&mut self) {
        self.messages.clear();
        self.messages.push(self.welcome.clone());
    }

    /// Standalone HTML page of the whole conversation
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut html = String::from(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Chat transcript</title></head>\n<body>\n",
        );
        for message in &self.messages {
            html.push_str(&message.to_html());
            html.push('\n');
        }
        html.push_str("</body>\n</html>\n");
        html
    }

    /// Messages sent by `sender`
    pub fn by_sender(&self, sender: Sender) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(move |m| m.sender == sender)
    }

    fn get_mut(&mut self, id: &MessageId) -> ClientResult<&mut ChatMessage> {
        self.messages
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or(ClientError::InvalidTransition("unknown message"))
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
