//! Session contract: cancellable streams of cumulative response snapshots.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A stream of cumulative response snapshots.
///
/// Each item is the *entire* response generated so far, not a delta since the
/// previous item. The stream ends by normal completion or by yielding one
/// terminal `Err`.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A live connection to a generation backend.
#[async_trait]
pub trait Session: Send + Sync {
    /// Start generating a response for `prompt`.
    ///
    /// Cancelling `cancel` stops backend work promptly; cancellation is not
    /// an error and must not surface one through the stream.
    async fn stream(&self, prompt: &str, cancel: CancellationToken) -> Result<SnapshotStream>;
}

/// Builds sessions; resolved once at construction, never inspected at call
/// sites.
pub trait SessionFactory: Send + Sync {
    /// Create a session primed with the given instructions.
    fn create(&self, instructions: &str) -> Result<Arc<dyn Session>>;
}
