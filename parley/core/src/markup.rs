//! Message Formatting
//!
//! A deliberately small markdown subset for assistant messages:
//!
//! - `**bold**`
//! - `*italic*`
//! - `` `code` ``
//! - newline → line break
//!
//! Delimiters pair up non-greedily within a single line. Spans are flat: the
//! inside of a delimited run is taken literally. A lone marker with no partner
//! on its line stays literal, while an unpartnered `**` reads as an empty
//! italic run. Anything fancier belongs to
//! a real markdown renderer, which is out of scope here.

/// Style of a formatted run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpanStyle {
    /// Unstyled text
    Plain,
    /// `**bold**`
    Bold,
    /// `*italic*`
    Italic,
    /// `` `code` ``
    Code,
    /// Hard line break
    LineBreak,
}

/// A styled run of text
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Span {
    /// How to render the run
    pub style: SpanStyle,
    /// Text of the run (empty for line breaks)
    pub text: String,
}

impl Span {
    /// Create a span
    pub fn new(style: SpanStyle, text: impl Into<String>) -> Self {
        Self {
            style,
            text: text.into(),
        }
    }

    /// Unstyled text
    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(SpanStyle::Plain, text)
    }

    /// Line break
    #[must_use]
    pub fn line_break() -> Self {
        Self::new(SpanStyle::LineBreak, "")
    }
}

/// Split message content into styled spans
#[must_use]
pub fn format_message(content: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    for (index, line) in content.split('\n').enumerate() {
        if index > 0 {
            spans.push(Span::line_break());
        }
        format_line(line, &mut spans);
    }
    spans
}

/// Render spans as HTML, escaping text
#[must_use]
pub fn to_html(spans: &[Span]) -> String {
    let mut html = String::new();
    for span in spans {
        let text = escape_html(&span.text);
        match span.style {
            SpanStyle::Plain => html.push_str(&text),
            SpanStyle::Bold => html.push_str(&format!("<strong>{text}</strong>")),
            SpanStyle::Italic => html.push_str(&format!("<em>{text}</em>")),
            SpanStyle::Code => html.push_str(&format!("<code>{text}</code>")),
            SpanStyle::LineBreak => html.push_str("<br>"),
        }
    }
    html
}

/// Concatenate the text of all spans, line breaks as `\n`
#[must_use]
pub fn to_plain(spans: &[Span]) -> String {
    spans
        .iter()
        .map(|s| match s.style {
            SpanStyle::LineBreak => "\n",
            _ => s.text.as_str(),
        })
        .collect()
}

fn format_line(line: &str, spans: &mut Vec<Span>) {
    let mut plain = String::new();
    let mut rest = line;

    while let Some(c) = rest.chars().next() {
        let styled = match c {
            '*' if rest.starts_with("**") => delimited(rest, "**", SpanStyle::Bold)
                .or_else(|| delimited(rest, "*", SpanStyle::Italic)),
            '*' => delimited(rest, "*", SpanStyle::Italic),
            '`' => delimited(rest, "`", SpanStyle::Code),
            _ => None,
        };

        match styled {
            Some((span, consumed)) => {
                if !plain.is_empty() {
                    spans.push(Span::plain(std::mem::take(&mut plain)));
                }
                spans.push(span);
                rest = &rest[consumed..];
            }
            None => {
                plain.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }

    if !plain.is_empty() {
        spans.push(Span::plain(plain));
    }
}

/// Match `marker ... marker` at the start of `text`.
/// Returns the span and the number of bytes consumed.
fn delimited(text: &str, marker: &str, style: SpanStyle) -> Option<(Span, usize)> {
    let inner_start = marker.len();
    let close = text[inner_start..].find(marker)?;
    let inner = &text[inner_start..inner_start + close];
    Some((Span::new(style, inner), inner_start + close + marker.len()))
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_text_is_one_span() {
        assert_eq!(format_message("hello"), vec![Span::plain("hello")]);
    }

    #[test]
    fn test_basic_styles() {
        let spans = format_message("a **b** *c* `d`");
        assert_eq!(
            spans,
            vec![
                Span::plain("a "),
                Span::new(SpanStyle::Bold, "b"),
                Span::plain(" "),
                Span::new(SpanStyle::Italic, "c"),
                Span::plain(" "),
                Span::new(SpanStyle::Code, "d"),
            ]
        );
    }

    #[test]
    fn test_newlines_become_breaks() {
        let spans = format_message("one\ntwo");
        assert_eq!(
            spans,
            vec![Span::plain("one"), Span::line_break(), Span::plain("two")]
        );
    }

    #[test]
    fn test_unclosed_markers_stay_literal() {
        assert_eq!(format_message("2 * 3"), vec![Span::plain("2 * 3")]);
        assert_eq!(format_message("`open"), vec![Span::plain("`open")]);
    }

    #[test]
    fn test_delimiters_do_not_cross_lines() {
        // A doubled marker left open on its line pairs with itself as an
        // empty italic run.
        let spans = format_message("**a\nb**");
        assert_eq!(
            spans,
            vec![
                Span::new(SpanStyle::Italic, ""),
                Span::plain("a"),
                Span::line_break(),
                Span::plain("b"),
                Span::new(SpanStyle::Italic, ""),
            ]
        );
        assert_eq!(to_html(&spans), "<em></em>a<br>b<em></em>");
    }

    #[test]
    fn test_code_is_literal() {
        let spans = format_message("`**x**`");
        assert_eq!(spans, vec![Span::new(SpanStyle::Code, "**x**")]);
    }

    #[test]
    fn test_html_rendering_escapes() {
        let html = to_html(&format_message("**<b>**\n`a&b`"));
        assert_eq!(html, "<strong>&lt;b&gt;</strong><br><code>a&amp;b</code>");
    }

    #[test]
    fn test_multibyte_text() {
        let spans = format_message("olá *mundo* 🎨");
        assert_eq!(
            spans,
            vec![
                Span::plain("olá "),
                Span::new(SpanStyle::Italic, "mundo"),
                Span::plain(" 🎨"),
            ]
        );
    }
}
