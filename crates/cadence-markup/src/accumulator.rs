//! Incremental accumulation of cumulative markup snapshots.
//!
//! Each streamed snapshot is the entire response so far. The accumulator
//! keeps the blocks of a frozen prefix and reparses only the growing tail,
//! so per-snapshot cost tracks the size of the open block rather than the
//! whole response.

use crate::document::{MarkupDocument, parse_blocks};

/// Accumulates cumulative text snapshots into a parsed document.
///
/// The frozen boundary only ever advances past block boundaries that later
/// input cannot reinterpret: everything up to (but excluding) the last
/// top-level block of the current text. Link reference definitions resolve
/// document-wide, so the cheap path is disabled outright when the text could
/// contain one.
#[derive(Debug, Default)]
pub struct MarkupAccumulator {
    text: String,
    frozen: Vec<crate::document::Block>,
    frozen_end: usize,
    freezing_disabled: bool,
}

impl MarkupAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest the latest cumulative snapshot.
    ///
    /// Returns `None` when the snapshot equals the previous one, otherwise
    /// the parsed document for the full text. A snapshot that extends the
    /// previous text reuses the frozen prefix; anything else resets and
    /// reparses from scratch.
    pub fn ingest(&mut self, full_content: &str) -> Option<MarkupDocument> {
        if full_content == self.text {
            return None;
        }
        if !full_content.starts_with(self.text.as_str()) {
            tracing::debug!(
                previous_len = self.text.len(),
                new_len = full_content.len(),
                "snapshot diverged from previous text, reparsing from scratch"
            );
            self.reset();
        }
        self.text.clear();
        self.text.push_str(full_content);

        if !self.freezing_disabled && self.text.contains("]:") {
            // Could be a link reference definition; thaw and stop freezing.
            self.freezing_disabled = true;
            self.frozen.clear();
            self.frozen_end = 0;
        }

        let (mut tail_blocks, boundary) = parse_blocks(&self.text[self.frozen_end..]);

        if !self.freezing_disabled {
            if let Some(boundary) = boundary {
                if boundary.block_index > 0 {
                    self.frozen.extend(tail_blocks.drain(..boundary.block_index));
                    self.frozen_end += boundary.offset;
                }
            }
        }

        let mut blocks = self.frozen.clone();
        blocks.extend(tail_blocks);
        Some(MarkupDocument { blocks })
    }

    /// The best current document, without consuming further input.
    pub fn finalize(&self) -> MarkupDocument {
        let (tail_blocks, _) = parse_blocks(&self.text[self.frozen_end..]);
        let mut blocks = self.frozen.clone();
        blocks.extend(tail_blocks);
        MarkupDocument { blocks }
    }

    /// Clear all accumulated state.
    pub fn reset(&mut self) {
        self.text.clear();
        self.frozen.clear();
        self.frozen_end = 0;
        self.freezing_disabled = false;
    }

    /// The cumulative text seen so far.
    pub fn source(&self) -> &str {
        &self.text
    }
}
