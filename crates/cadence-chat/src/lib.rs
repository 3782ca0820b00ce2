//! cadence-chat: the streaming chat runtime
//!
//! This crate orchestrates one send-receive cycle at a time against a
//! language-generation session: it consumes cumulative response snapshots,
//! parses them incrementally, renders styled text on a debounced and
//! backpressured worker, and guarantees that user actions racing an
//! in-flight response (clear, retry, re-send) never produce torn or
//! duplicated updates. Staleness is detected with epoch counters rather
//! than locks held across suspension points.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod message;
pub mod telemetry;
mod worker;

pub use config::{ChatConfig, FallbackStrings};
pub use controller::ChatController;
pub use error::ErrorKind;
pub use events::ChatEvent;
pub use message::{Message, Role};
pub use telemetry::TelemetrySnapshot;
