//! Terminal Surface
//!
//! Renders [`UiMessage`]s as a scrolling transcript. Streamed replies are
//! printed as they grow: each update writes only the text past what is
//! already on screen.

use std::io::{self, Write};
use std::path::PathBuf;

use crossterm::style::Stylize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use parley_core::conversation::ChatMessage;
use parley_core::dashboard::indicator_label;
use parley_core::markup::{Span, SpanStyle};
use parley_core::messages::{MessageId, Sender};
use parley_core::mode::InputField;
use parley_core::recording::IDLE_STATUS;
use parley_core::status::ServiceStatusMap;
use parley_core::UiMessage;

/// Fallback width when the terminal size is unknown
const DEFAULT_WIDTH: usize = 80;

fn width() -> usize {
    crossterm::terminal::size()
        .map(|(cols, _)| usize::from(cols).clamp(20, 120))
        .unwrap_or(DEFAULT_WIDTH)
}

/// Styled text for a span list
pub fn styled(spans: &[Span]) -> String {
    let mut out = String::new();
    for span in spans {
        let piece = match span.style {
            SpanStyle::Plain => span.text.clone(),
            SpanStyle::Bold => span.text.as_str().bold().to_string(),
            SpanStyle::Italic => span.text.as_str().italic().to_string(),
            SpanStyle::Code => span.text.as_str().yellow().to_string(),
            SpanStyle::LineBreak => "\n".to_string(),
        };
        out.push_str(&piece);
    }
    out
}

fn sender_tag(sender: Sender) -> String {
    match sender {
        Sender::User => format!("{}:", sender.label()).green().bold().to_string(),
        Sender::Assistant => format!("{}:", sender.label()).cyan().bold().to_string(),
    }
}

/// Print a dim one-line notice
pub fn notice(text: &str) {
    println!("{}", text.dark_grey());
}

/// Print the service indicator line
pub fn print_services(map: &ServiceStatusMap) {
    if map.is_empty() {
        notice("[services] unknown");
        return;
    }
    let parts: Vec<String> = map
        .iter()
        .map(|(name, online)| {
            let label = indicator_label(online);
            let label = if online { label.green() } else { label.red() };
            format!("{name}: {label}")
        })
        .collect();
    println!("{} {}", "[services]".dark_grey(), parts.join(", "));
}

/// Streaming reply currently on screen
struct Streaming {
    id: MessageId,
    printed: usize,
}

/// Transcript renderer
pub struct TerminalSurface {
    streaming: Option<Streaming>,
    image_dir: PathBuf,
    status_deadline: Option<Instant>,
}

impl TerminalSurface {
    /// Surface saving generated images into `image_dir`
    pub fn new(image_dir: PathBuf) -> Self {
        Self {
            streaming: None,
            image_dir,
            status_deadline: None,
        }
    }

    /// Render messages until the app side closes the channel
    ///
    /// Transient recording statuses revert to the idle text once their
    /// deadline passes.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<UiMessage>) {
        loop {
            let next = match self.status_deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        self.status_deadline = None;
                        notice(&format!("[mic] {IDLE_STATUS}"));
                        continue;
                    }
                },
                None => rx.recv().await,
            };
            let Some(msg) = next else { break };
            self.render(msg);
            let _ = io::stdout().flush();
        }
        tracing::debug!("Surface channel closed");
    }

    /// Print a finished message
    pub fn print_message(&self, message: &ChatMessage) {
        let body = textwrap::fill(&styled(&message.spans()), width().saturating_sub(2));
        println!("{} {}", sender_tag(message.sender), body);
    }

    fn render(&mut self, msg: UiMessage) {
        match msg {
            UiMessage::MessageAdded { message } => {
                self.end_stream();
                if message.streaming {
                    print!("{} {}", sender_tag(message.sender), message.content);
                    self.streaming = Some(Streaming {
                        id: message.id.clone(),
                        printed: message.content.len(),
                    });
                } else if let Some(image) = &message.image {
                    self.print_message(&message);
                    let path = self.image_dir.join(format!("parley-{}.png", message.id));
                    match std::fs::write(&path, &image.png) {
                        Ok(()) => notice(&format!("(saved to {})", path.display())),
                        Err(e) => tracing::warn!(error = %e, path = ?path, "Failed to save image"),
                    }
                } else if message.sender == Sender::Assistant {
                    self.print_message(&message);
                }
            }
            UiMessage::MessageUpdated { id, content } => {
                if let Some(streaming) = self.streaming.as_mut().filter(|s| s.id == id) {
                    if let Some(delta) = content.get(streaming.printed..) {
                        print!("{delta}");
                    }
                    streaming.printed = content.len();
                }
            }
            UiMessage::MessageFinalized { id } => {
                if self.streaming.as_ref().is_some_and(|s| s.id == id) {
                    self.end_stream();
                }
            }
            UiMessage::ConversationCleared => notice("(conversation cleared)"),
            UiMessage::SessionChanged { session_id } => {
                tracing::debug!(session_id = ?session_id, "Session changed");
            }
            UiMessage::Loading { text } => {
                if let Some(text) = text {
                    notice(&text);
                }
            }
            UiMessage::InputCleared { .. } => {}
            UiMessage::InputFilled { field, text } => {
                if field == InputField::Message {
                    notice(&format!("transcript: {text}"));
                    notice("(press Enter to send it)");
                }
            }
            UiMessage::ModeChanged { view } => {
                notice(&format!("[{} mode] {}", view.active, view.placeholder));
            }
            UiMessage::Recording { active } => {
                tracing::debug!(active, "Recording indicator");
            }
            UiMessage::RecordingStatus { text, revert_after } => {
                notice(&format!("[mic] {text}"));
                self.status_deadline = revert_after.map(|d| Instant::now() + d);
            }
            UiMessage::Alert { message } => {
                self.end_stream();
                println!("{} {}", "!".red().bold(), message.as_str().red());
            }
        }
    }

    fn end_stream(&mut self) {
        if self.streaming.take().is_some() {
            println!();
        }
    }
}
