//! cadence-session: language-generation session adapters
//!
//! This crate defines the contract between the chat runtime and a
//! language-generation backend: a cancellable stream of *cumulative* content
//! snapshots. It also provides a latest-only coalescing combinator and one
//! concrete SSE-backed adapter.

pub mod error;
pub mod latest;
pub mod session;
pub mod sse;

pub use error::Error;
pub use latest::latest_only;
pub use session::{Session, SessionFactory, SnapshotStream};
pub use sse::{SseSession, SseSessionFactory};
