//! cadence-markup: incremental markup parsing and styled-text rendering
//!
//! This crate turns cumulative text snapshots into parsed documents and
//! parsed documents into presentation-agnostic styled text. The accumulator
//! reuses previously parsed structure when a snapshot extends the previous
//! one, so live streaming stays cheap.

pub mod accumulator;
pub mod document;
pub mod render;
pub mod styled;

pub use accumulator::MarkupAccumulator;
pub use document::{Block, MarkupDocument};
pub use render::{MarkdownRenderer, Renderer};
pub use styled::{SpanStyle, StyledLine, StyledSpan, StyledText};
