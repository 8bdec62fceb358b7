//! Input Mode Controller
//!
//! Exactly one input mode is active at a time. Activating a mode deactivates
//! the others in the same call; surfaces learn about the switch through
//! [`UiMessage::ModeChanged`](crate::messages::UiMessage::ModeChanged).
//!
//! The mode also decides where a submission goes: image mode routes to image
//! generation and validates the prompt field, every other mode routes to chat
//! and validates the message field.

use serde::{Deserialize, Serialize};

/// Exclusive input mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Typed chat messages
    #[default]
    Text,
    /// Recorded audio, transcribed into the message field
    Audio,
    /// Image generation prompts
    Image,
}

impl Mode {
    /// All modes, in shortcut order
    pub const ALL: [Mode; 3] = [Mode::Text, Mode::Audio, Mode::Image];

    /// Placeholder shown in the input for this mode
    #[must_use]
    pub fn placeholder(self) -> &'static str {
        match self {
            Self::Text => "Type your message here...",
            Self::Audio => "Record audio or type here...",
            Self::Image => "Describe the image you want to generate...",
        }
    }

    /// Input that receives focus on activation (`None` keeps focus where it is)
    #[must_use]
    pub fn focus(self) -> Option<InputField> {
        match self {
            Self::Text => Some(InputField::Message),
            Self::Audio => None,
            Self::Image => Some(InputField::ImagePrompt),
        }
    }

    /// Field validated on submit
    #[must_use]
    pub fn submit_field(self) -> InputField {
        match self {
            Self::Image => InputField::ImagePrompt,
            Self::Text | Self::Audio => InputField::Message,
        }
    }

    /// Ctrl+1/2/3 selection
    #[must_use]
    pub fn from_shortcut(digit: char) -> Option<Self> {
        match digit {
            '1' => Some(Self::Text),
            '2' => Some(Self::Audio),
            '3' => Some(Self::Image),
            _ => None,
        }
    }

    /// Lowercase name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
            Self::Image => "image",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('/').to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "audio" => Ok(Self::Audio),
            "image" => Ok(Self::Image),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// Input fields a surface shows
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputField {
    /// Chat message input (text and audio modes)
    Message,
    /// Image prompt input (image mode)
    ImagePrompt,
}

/// What a surface should display after a mode change
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeView {
    /// The only active mode; every other region is inactive
    pub active: Mode,
    /// Placeholder for the message input
    pub placeholder: &'static str,
    /// Input to focus, if focus should move
    pub focus: Option<InputField>,
}

impl ModeView {
    fn for_mode(mode: Mode) -> Self {
        Self {
            active: mode,
            placeholder: mode.placeholder(),
            focus: mode.focus(),
        }
    }

    /// Whether a mode's region is shown
    #[must_use]
    pub fn is_active(&self, mode: Mode) -> bool {
        self.active == mode
    }
}

/// Where a submission is routed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitRoute {
    /// Stream a chat reply
    Chat,
    /// Request image generation
    Image,
}

/// Tracks the exclusive input mode
#[derive(Clone, Debug, Default)]
pub struct ModeController {
    current: Mode,
}

impl ModeController {
    /// Start in text mode
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Active mode
    #[must_use]
    pub fn current(&self) -> Mode {
        self.current
    }

    /// Current view, for surfaces that attach after startup
    #[must_use]
    pub fn view(&self) -> ModeView {
        ModeView::for_mode(self.current)
    }

    /// Switch modes
    ///
    /// Returns the new view when the mode changed and `None` when `mode` was
    /// already active, so repeating a call has no further effect.
    pub fn set_mode(&mut self, mode: Mode) -> Option<ModeView> {
        if self.current == mode {
            return None;
        }
        tracing::debug!(from = %self.current, to = %mode, "Switching input mode");
        self.current = mode;
        Some(ModeView::for_mode(mode))
    }

    /// Route a submission. Checked before any input validation.
    #[must_use]
    pub fn route_submit(&self) -> SubmitRoute {
        match self.current {
            Mode::Image => SubmitRoute::Image,
            Mode::Text | Mode::Audio => SubmitRoute::Chat,
        }
    }
}
