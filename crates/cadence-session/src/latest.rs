//! Latest-only coalescing for snapshot streams.
//!
//! Snapshots are cumulative, so a consumer that falls behind only ever needs
//! the newest one. This combinator is a single-slot, drop-oldest buffer:
//! intermediate snapshots may be discarded, terminal items never are.

use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::Error;
use crate::session::SnapshotStream;

#[derive(Default)]
struct Slot {
    latest: Option<String>,
    error: Option<Error>,
    done: bool,
}

/// Wrap `inner` so that only the newest unconsumed snapshot is retained.
pub fn latest_only(mut inner: SnapshotStream) -> SnapshotStream {
    let slot = Arc::new(Mutex::new(Slot::default()));
    let notify = Arc::new(Notify::new());

    let producer_slot = Arc::clone(&slot);
    let producer_notify = Arc::clone(&notify);
    tokio::spawn(async move {
        while let Some(item) = inner.next().await {
            let terminal = {
                let mut slot = producer_slot.lock();
                match item {
                    Ok(snapshot) => {
                        slot.latest = Some(snapshot);
                        false
                    }
                    Err(e) => {
                        slot.error = Some(e);
                        slot.done = true;
                        true
                    }
                }
            };
            producer_notify.notify_one();
            if terminal {
                return;
            }
        }
        producer_slot.lock().done = true;
        producer_notify.notify_one();
    });

    Box::pin(stream! {
        loop {
            let notified = notify.notified();
            let (item, error, done) = {
                let mut slot = slot.lock();
                (slot.latest.take(), slot.error.take(), slot.done)
            };
            if let Some(snapshot) = item {
                yield Ok(snapshot);
            }
            if let Some(e) = error {
                yield Err(e);
                return;
            }
            if done {
                return;
            }
            notified.await;
        }
    })
}
