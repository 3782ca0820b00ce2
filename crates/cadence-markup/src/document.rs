//! Parsed markup document model.
//!
//! Parsing and rendering are split so that the expensive render step can run
//! on a background worker against an owned `MarkupDocument` value while the
//! accumulator keeps ingesting snapshots.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};

use crate::styled::{SpanStyle, StyledSpan};

/// A top-level unit of parsed markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Paragraph {
        spans: Vec<StyledSpan>,
    },
    Heading {
        level: u8,
        spans: Vec<StyledSpan>,
    },
    CodeBlock {
        language: Option<String>,
        code: String,
    },
    /// One rendered list entry. Nested lists flatten into items with a
    /// greater `depth`; `index` is set for ordered lists.
    ListItem {
        depth: usize,
        index: Option<u64>,
        spans: Vec<StyledSpan>,
    },
    BlockQuote {
        spans: Vec<StyledSpan>,
    },
    Rule,
}

impl Block {
    fn spans(&self) -> &[StyledSpan] {
        match self {
            Block::Paragraph { spans }
            | Block::Heading { spans, .. }
            | Block::ListItem { spans, .. }
            | Block::BlockQuote { spans } => spans,
            Block::CodeBlock { .. } | Block::Rule => &[],
        }
    }
}

/// A parsed document: an ordered list of blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupDocument {
    pub blocks: Vec<Block>,
}

impl MarkupDocument {
    /// Parse the full text in one shot.
    pub fn parse(text: &str) -> Self {
        let (blocks, _) = parse_blocks(text);
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of inline spans carrying a link target
    pub fn link_count(&self) -> usize {
        self.blocks
            .iter()
            .flat_map(|b| b.spans().iter())
            .filter(|s| s.style.link.is_some())
            .count()
    }
}

/// Where parsed blocks may be split so that a prefix can be frozen: the byte
/// offset (into the parsed text) where the last top-level block starts, and
/// how many finished blocks precede it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TailBoundary {
    pub offset: usize,
    pub block_index: usize,
}

/// Parse `text` into blocks, also reporting the start of its last top-level
/// block. Every event before that boundary belongs to a block that later
/// input can no longer reinterpret (reference definitions excepted, which the
/// accumulator guards against separately).
pub(crate) fn parse_blocks(text: &str) -> (Vec<Block>, Option<TailBoundary>) {
    let mut builder = DocumentBuilder::default();
    let mut depth = 0usize;
    let mut boundary: Option<TailBoundary> = None;

    for (event, range) in Parser::new(text).into_offset_iter() {
        match &event {
            Event::Start(_) => {
                if depth == 0 {
                    boundary = Some(TailBoundary {
                        offset: line_start(text, range.start),
                        block_index: builder.blocks.len(),
                    });
                }
                depth += 1;
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Rule => {
                if depth == 0 {
                    boundary = Some(TailBoundary {
                        offset: line_start(text, range.start),
                        block_index: builder.blocks.len(),
                    });
                }
            }
            _ => {}
        }
        builder.push(event);
    }

    (builder.finish(), boundary)
}

/// Snap a byte offset back to the start of its line, so a standalone reparse
/// of the tail sees the same leading indentation.
fn line_start(text: &str, offset: usize) -> usize {
    text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

/// Scope of one open list while building.
#[derive(Debug)]
struct ListScope {
    next_index: Option<u64>,
}

/// Scope of one open list item.
#[derive(Debug)]
struct ItemScope {
    depth: usize,
    index: Option<u64>,
    /// Set once the item's own text was flushed (before a nested list)
    emitted: bool,
}

/// Builds `Block`s from a pulldown-cmark event sequence.
#[derive(Debug, Default)]
pub(crate) struct DocumentBuilder {
    blocks: Vec<Block>,
    spans: Vec<StyledSpan>,
    style: SpanStyle,
    style_stack: Vec<SpanStyle>,
    heading_level: Option<u8>,
    blockquote_depth: usize,
    list_stack: Vec<ListScope>,
    item_stack: Vec<ItemScope>,
    code: Option<(Option<String>, String)>,
}

impl DocumentBuilder {
    pub(crate) fn finish(mut self) -> Vec<Block> {
        // An unterminated snapshot can end mid-code-block; keep what we have.
        if let Some((language, code)) = self.code.take() {
            self.blocks.push(Block::CodeBlock { language, code });
        }
        if !self.spans.is_empty() {
            let spans = std::mem::take(&mut self.spans);
            self.blocks.push(Block::Paragraph { spans });
        }
        self.blocks
    }

    fn push_style(&mut self, f: impl FnOnce(&mut SpanStyle)) {
        self.style_stack.push(self.style.clone());
        f(&mut self.style);
    }

    fn pop_style(&mut self) {
        if let Some(style) = self.style_stack.pop() {
            self.style = style;
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.spans
            .push(StyledSpan::styled(text, self.style.clone()));
    }

    /// Flush pending inline spans into the block for the current context.
    fn flush_block(&mut self) {
        let spans = std::mem::take(&mut self.spans);
        if let Some(item) = self.item_stack.last_mut() {
            if spans.is_empty() && item.emitted {
                return;
            }
            item.emitted = true;
            self.blocks.push(Block::ListItem {
                depth: item.depth,
                index: item.index,
                spans,
            });
        } else if self.blockquote_depth > 0 {
            if spans.is_empty() {
                return;
            }
            self.blocks.push(Block::BlockQuote { spans });
        } else if let Some(level) = self.heading_level {
            self.blocks.push(Block::Heading { level, spans });
        } else {
            if spans.is_empty() {
                return;
            }
            self.blocks.push(Block::Paragraph { spans });
        }
    }

    pub(crate) fn push(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => {
                if let Some((_, code)) = self.code.as_mut() {
                    code.push_str(&text);
                } else {
                    self.push_text(&text);
                }
            }
            Event::Code(code) => {
                let mut style = self.style.clone();
                style.code = true;
                self.spans.push(StyledSpan::styled(code.into_string(), style));
            }
            Event::InlineMath(math) | Event::DisplayMath(math) => {
                let mut style = self.style.clone();
                style.code = true;
                self.spans.push(StyledSpan::styled(math.into_string(), style));
            }
            Event::SoftBreak => self.push_text(" "),
            Event::HardBreak => {
                // Line break within a block; the renderer splits on it
                self.spans.push(StyledSpan::plain("\n"));
            }
            Event::Rule => self.blocks.push(Block::Rule),
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                self.push_text(marker);
            }
            Event::Html(_) | Event::InlineHtml(_) | Event::FootnoteReference(_) => {}
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {
                // Secondary paragraphs inside an item or quote run on after
                // a separating space instead of opening a new block.
                if (!self.item_stack.is_empty() || self.blockquote_depth > 0)
                    && !self.spans.is_empty()
                {
                    self.push_text(" ");
                }
            }
            Tag::Heading { level, .. } => {
                self.flush_block();
                self.heading_level = Some(heading_level_number(level));
            }
            Tag::CodeBlock(kind) => {
                self.flush_block();
                let language = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => {
                        Some(lang.into_string())
                    }
                    _ => None,
                };
                self.code = Some((language, String::new()));
            }
            Tag::List(start) => {
                // A nested list closes out the enclosing item's own text
                if self.item_stack.last().is_some() && !self.spans.is_empty() {
                    self.flush_block();
                }
                self.list_stack.push(ListScope { next_index: start });
            }
            Tag::Item => {
                let depth = self.list_stack.len();
                let index = self.list_stack.last_mut().and_then(|scope| {
                    let index = scope.next_index;
                    scope.next_index = index.map(|i| i + 1);
                    index
                });
                self.item_stack.push(ItemScope {
                    depth,
                    index,
                    emitted: false,
                });
            }
            Tag::BlockQuote(_) => {
                self.flush_block();
                self.blockquote_depth += 1;
            }
            Tag::Emphasis => self.push_style(|s| s.italic = true),
            Tag::Strong => self.push_style(|s| s.bold = true),
            Tag::Strikethrough => self.push_style(|s| s.strikethrough = true),
            Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. } => {
                let url = dest_url.into_string();
                self.push_style(|s| s.link = Some(url));
            }
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                if self.item_stack.is_empty() && self.blockquote_depth == 0 {
                    self.flush_block();
                }
            }
            TagEnd::Heading(_) => {
                self.flush_block();
                self.heading_level = None;
            }
            TagEnd::CodeBlock => {
                if let Some((language, code)) = self.code.take() {
                    self.blocks.push(Block::CodeBlock { language, code });
                }
            }
            TagEnd::List(_) => {
                self.list_stack.pop();
            }
            TagEnd::Item => {
                self.flush_block();
                self.item_stack.pop();
            }
            TagEnd::BlockQuote(_) => {
                self.flush_block();
                self.blockquote_depth = self.blockquote_depth.saturating_sub(1);
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                self.pop_style();
            }
            TagEnd::Link | TagEnd::Image => self.pop_style(),
            _ => {}
        }
    }
}

fn heading_level_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
