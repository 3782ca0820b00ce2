//! Rendering parsed documents into styled text.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::document::{Block, MarkupDocument};
use crate::styled::{SpanStyle, StyledLine, StyledSpan, StyledText};

/// Turns a parsed document into styled text.
///
/// Implementations must be pure: no shared state, safe to call from a
/// background task, and the output depends only on the document.
pub trait Renderer: Send + Sync {
    fn render(&self, document: &MarkupDocument) -> StyledText;
}

/// Default markdown renderer.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    width: usize,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self { width: 80 }
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_width(width: usize) -> Self {
        Self { width: width.max(8) }
    }

    /// Append inline spans as display lines, splitting on embedded newlines
    /// (hard breaks). `prefix` opens the first line; `restyle` is applied to
    /// every span.
    fn append_inline(
        &self,
        lines: &mut Vec<StyledLine>,
        prefix: Option<StyledSpan>,
        spans: &[StyledSpan],
        restyle: impl Fn(&SpanStyle) -> SpanStyle,
    ) {
        let mut current: Vec<StyledSpan> = prefix.into_iter().collect();
        for span in spans {
            let style = restyle(&span.style);
            let mut first = true;
            for segment in span.content.split('\n') {
                if !first {
                    lines.push(StyledLine::new(std::mem::take(&mut current)));
                }
                first = false;
                if segment.is_empty() {
                    continue;
                }
                let content = if style.code {
                    format!("`{}`", segment)
                } else {
                    segment.to_string()
                };
                current.push(StyledSpan::styled(content, style.clone()));
            }
        }
        lines.push(StyledLine::new(current));
    }

    /// Truncate one code line to the display width, with a 2-space indent
    /// and an ellipsis when it overflows.
    fn code_line(&self, line: &str) -> String {
        let avail = self.width.saturating_sub(4);
        if UnicodeWidthStr::width(line) <= avail {
            return format!("  {}", line);
        }
        let mut taken = String::new();
        let mut used = 0;
        let budget = avail.saturating_sub(1);
        for ch in line.chars() {
            let w = UnicodeWidthChar::width(ch).unwrap_or(0);
            if used + w > budget {
                break;
            }
            used += w;
            taken.push(ch);
        }
        format!("  {}…", taken)
    }
}

fn dim() -> SpanStyle {
    SpanStyle {
        dim: true,
        ..SpanStyle::default()
    }
}

impl Renderer for MarkdownRenderer {
    fn render(&self, document: &MarkupDocument) -> StyledText {
        let mut lines: Vec<StyledLine> = Vec::new();
        let blocks = &document.blocks;

        for (i, block) in blocks.iter().enumerate() {
            match block {
                Block::Paragraph { spans } => {
                    self.append_inline(&mut lines, None, spans, Clone::clone);
                    lines.push(StyledLine::default());
                }
                Block::Heading { spans, .. } => {
                    self.append_inline(&mut lines, None, spans, |s| SpanStyle {
                        bold: true,
                        ..s.clone()
                    });
                    lines.push(StyledLine::default());
                }
                Block::CodeBlock { code, .. } => {
                    let style = SpanStyle {
                        code: true,
                        dim: true,
                        ..SpanStyle::default()
                    };
                    for code_line in code.lines() {
                        lines.push(StyledLine::new(vec![StyledSpan::styled(
                            self.code_line(code_line),
                            style.clone(),
                        )]));
                    }
                    lines.push(StyledLine::default());
                }
                Block::ListItem { depth, index, spans } => {
                    let indent = "  ".repeat(depth.saturating_sub(1));
                    let marker = match index {
                        Some(n) => format!("{}{}. ", indent, n),
                        None => format!("{}• ", indent),
                    };
                    self.append_inline(
                        &mut lines,
                        Some(StyledSpan::styled(marker, dim())),
                        spans,
                        Clone::clone,
                    );
                    // Blank separator only after the last item of the list
                    let next_is_item =
                        matches!(blocks.get(i + 1), Some(Block::ListItem { .. }));
                    if !next_is_item {
                        lines.push(StyledLine::default());
                    }
                }
                Block::BlockQuote { spans } => {
                    self.append_inline(
                        &mut lines,
                        Some(StyledSpan::styled("> ", dim())),
                        spans,
                        Clone::clone,
                    );
                    lines.push(StyledLine::default());
                }
                Block::Rule => {
                    lines.push(StyledLine::new(vec![StyledSpan::styled(
                        "─".repeat(self.width),
                        dim(),
                    )]));
                    lines.push(StyledLine::default());
                }
            }
        }

        // Trim trailing blank lines
        while lines.last().is_some_and(|l| l.is_blank()) {
            lines.pop();
        }

        StyledText::new(lines)
    }
}
