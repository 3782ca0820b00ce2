//! Styled text values produced by rendering.
//!
//! `StyledText` is the boundary between this crate and whatever presentation
//! layer displays the chat: an owned list of lines, each a list of spans with
//! flat style attributes. The display layer maps it onto its own text types.

use serde::{Deserialize, Serialize};

/// Style attributes for a single span of text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanStyle {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub code: bool,
    pub dim: bool,
    /// Link target when this span is part of a link
    pub link: Option<String>,
}

impl SpanStyle {
    /// Whether every attribute is unset
    pub fn is_plain(&self) -> bool {
        *self == SpanStyle::default()
    }
}

/// A run of text with a single style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyledSpan {
    pub content: String,
    pub style: SpanStyle,
}

impl StyledSpan {
    /// Create an unstyled span
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            style: SpanStyle::default(),
        }
    }

    /// Create a span with the given style
    pub fn styled(content: impl Into<String>, style: SpanStyle) -> Self {
        Self {
            content: content.into(),
            style,
        }
    }
}

/// A single display line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyledLine {
    pub spans: Vec<StyledSpan>,
}

impl StyledLine {
    pub fn new(spans: Vec<StyledSpan>) -> Self {
        Self { spans }
    }

    /// Whether this line has no visible content
    pub fn is_blank(&self) -> bool {
        self.spans.iter().all(|s| s.content.is_empty())
    }

    /// Concatenated span contents
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.content.as_str()).collect()
    }
}

/// Rendered output: an ordered list of styled lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyledText {
    pub lines: Vec<StyledLine>,
}

impl StyledText {
    pub fn new(lines: Vec<StyledLine>) -> Self {
        Self { lines }
    }

    /// Wrap raw text verbatim with no styling, one line per newline-separated
    /// segment. `to_plain_string` on the result round-trips the input exactly.
    pub fn plain(text: &str) -> Self {
        let lines = text
            .split('\n')
            .map(|segment| {
                if segment.is_empty() {
                    StyledLine::default()
                } else {
                    StyledLine::new(vec![StyledSpan::plain(segment)])
                }
            })
            .collect();
        Self { lines }
    }

    /// Strip all styling back to plain characters
    pub fn to_plain_string(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of spans carrying a link target
    pub fn link_count(&self) -> usize {
        self.lines
            .iter()
            .flat_map(|l| l.spans.iter())
            .filter(|s| s.style.link.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_round_trips_verbatim() {
        let inputs = [
            "hello",
            "line one\nline two",
            "",
            "\n",
            "trailing newline\n",
            "\n\nleading blanks",
            "unicode: héllo wörld ❤",
        ];
        for input in inputs {
            let styled = StyledText::plain(input);
            assert_eq!(styled.to_plain_string(), input, "input: {:?}", input);
        }
    }

    #[test]
    fn test_plain_has_no_styling() {
        let styled = StyledText::plain("some **raw** text");
        for line in &styled.lines {
            for span in &line.spans {
                assert!(span.style.is_plain());
            }
        }
        assert_eq!(styled.link_count(), 0);
    }

    #[test]
    fn test_link_count() {
        let mut style = SpanStyle::default();
        style.link = Some("https://example.com".to_string());
        let text = StyledText::new(vec![StyledLine::new(vec![
            StyledSpan::plain("see "),
            StyledSpan::styled("here", style),
        ])]);
        assert_eq!(text.link_count(), 1);
    }
}
