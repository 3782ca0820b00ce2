//! Debounced, backpressured render worker.
//!
//! A single consumer loop reads from a one-slot mailbox: scheduling a render
//! while one is pending replaces the pending request instead of queueing.
//! Each dequeued request waits out a debounce interval to coalesce bursts,
//! then re-checks its epoch before touching the renderer and again (inside
//! the publish callback, under the state lock) after rendering, so work made
//! stale at any point is discarded without a visible side effect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cadence_markup::{MarkupDocument, Renderer, StyledText};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::telemetry::RenderCounters;

/// A render scheduled for one parsed document under one render epoch.
#[derive(Debug)]
pub(crate) struct RenderRequest {
    pub epoch: u64,
    pub document: MarkupDocument,
}

/// Single-slot, drop-oldest mailbox feeding the render worker.
#[derive(Default)]
pub(crate) struct RenderMailbox {
    slot: Mutex<Option<RenderRequest>>,
    notify: Notify,
}

impl RenderMailbox {
    /// Replace any pending request with this one. Returns `true` when a
    /// pending request was displaced — the displaced request was never
    /// looked at, which is backpressure, not staleness.
    pub fn put(&self, request: RenderRequest) -> bool {
        let displaced = self.slot.lock().replace(request).is_some();
        self.notify.notify_one();
        displaced
    }

    async fn take(&self) -> RenderRequest {
        loop {
            let notified = self.notify.notified();
            if let Some(request) = self.slot.lock().take() {
                return request;
            }
            notified.await;
        }
    }
}

/// Spawn the worker loop.
///
/// `publish` runs after rendering; it must re-check the request's epoch
/// under the owning state lock and return whether the result was committed.
pub(crate) fn spawn_render_worker(
    mailbox: Arc<RenderMailbox>,
    renderer: Arc<dyn Renderer>,
    render_epoch: Arc<AtomicU64>,
    counters: Arc<RenderCounters>,
    debounce: Duration,
    cancel: CancellationToken,
    publish: impl Fn(u64, StyledText) -> bool + Send + Sync + 'static,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let request = tokio::select! {
                _ = cancel.cancelled() => return,
                request = mailbox.take() => request,
            };

            // Coalesce bursts before doing anything expensive
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(debounce) => {}
            }

            if render_epoch.load(Ordering::Acquire) != request.epoch {
                counters.record_stale_before_render();
                continue;
            }

            let styled = renderer.render(&request.document);

            // The epoch may have moved while rendering
            if publish(request.epoch, styled) {
                counters.record_committed();
            } else {
                counters.record_stale_after_render();
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_markup::MarkdownRenderer;

    fn request(epoch: u64, text: &str) -> RenderRequest {
        RenderRequest {
            epoch,
            document: MarkupDocument::parse(text),
        }
    }

    #[test]
    fn test_mailbox_replaces_pending() {
        let mailbox = RenderMailbox::default();
        assert!(!mailbox.put(request(1, "a")));
        assert!(mailbox.put(request(2, "b")));
        assert!(mailbox.put(request(3, "c")));
    }

    #[tokio::test]
    async fn test_mailbox_take_gets_newest() {
        let mailbox = RenderMailbox::default();
        mailbox.put(request(1, "old"));
        mailbox.put(request(2, "new"));
        let taken = mailbox.take().await;
        assert_eq!(taken.epoch, 2);
    }

    struct WorkerHarness {
        mailbox: Arc<RenderMailbox>,
        epoch: Arc<AtomicU64>,
        counters: Arc<RenderCounters>,
        cancel: CancellationToken,
        published: Arc<Mutex<Vec<StyledText>>>,
    }

    /// Spawn a worker whose publish callback commits while the live epoch
    /// still matches, mirroring the controller's epoch-guarded publish.
    fn harness(debounce_ms: u64) -> WorkerHarness {
        let mailbox = Arc::new(RenderMailbox::default());
        let epoch = Arc::new(AtomicU64::new(0));
        let counters = Arc::new(RenderCounters::new());
        let cancel = CancellationToken::new();
        let published: Arc<Mutex<Vec<StyledText>>> = Arc::new(Mutex::new(Vec::new()));

        let publish_epoch = Arc::clone(&epoch);
        let publish_sink = Arc::clone(&published);
        let _worker = spawn_render_worker(
            Arc::clone(&mailbox),
            Arc::new(MarkdownRenderer::new()),
            Arc::clone(&epoch),
            Arc::clone(&counters),
            Duration::from_millis(debounce_ms),
            cancel.clone(),
            move |epoch, styled| {
                if publish_epoch.load(Ordering::Acquire) != epoch {
                    return false;
                }
                publish_sink.lock().push(styled);
                true
            },
        );

        WorkerHarness {
            mailbox,
            epoch,
            counters,
            cancel,
            published,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_commits_current_request() {
        let h = harness(30);
        let epoch = h.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        h.counters.record_scheduled();
        h.mailbox.put(request(epoch, "hello **world**"));

        let counters = Arc::clone(&h.counters);
        wait_until(move || counters.snapshot(0).committed_updates == 1).await;

        let published = h.published.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].to_plain_string(), "hello world");
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_discards_stale_before_render() {
        let h = harness(30);
        h.counters.record_scheduled();
        h.mailbox.put(request(1, "about to go stale"));
        // Bump the live epoch while the request waits out the debounce
        h.epoch.store(2, Ordering::Release);

        let counters = Arc::clone(&h.counters);
        wait_until(move || counters.snapshot(0).stale_discarded_before_render == 1).await;

        assert!(h.published.lock().is_empty());
        assert_eq!(h.counters.snapshot(0).committed_updates, 0);
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_discards_stale_after_render() {
        // A publish callback that always sees a moved epoch exercises the
        // post-render check.
        let mailbox = Arc::new(RenderMailbox::default());
        let epoch = Arc::new(AtomicU64::new(1));
        let counters = Arc::new(RenderCounters::new());
        let cancel = CancellationToken::new();

        let _worker = spawn_render_worker(
            Arc::clone(&mailbox),
            Arc::new(MarkdownRenderer::new()),
            Arc::clone(&epoch),
            Arc::clone(&counters),
            Duration::from_millis(30),
            cancel.clone(),
            |_, _| false,
        );

        counters.record_scheduled();
        mailbox.put(request(1, "rendered then discarded"));

        let probe = Arc::clone(&counters);
        wait_until(move || probe.snapshot(0).stale_discarded_after_render == 1).await;
        assert_eq!(counters.snapshot(0).committed_updates, 0);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_coalesces_burst_to_latest() {
        let h = harness(30);
        // Burst three schedules before the debounce elapses; each bump
        // makes the previous request stale and the replacement drops it.
        for text in ["one", "two", "three"] {
            h.counters.record_scheduled();
            let epoch = h.epoch.fetch_add(1, Ordering::AcqRel) + 1;
            if h.mailbox.put(request(epoch, text)) {
                h.counters.record_dropped_by_backpressure();
            }
        }

        let counters = Arc::clone(&h.counters);
        wait_until(move || counters.snapshot(0).committed_updates == 1).await;

        let published = h.published.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].to_plain_string(), "three");

        let snapshot = h.counters.snapshot(5);
        assert!(snapshot.is_conserved(), "snapshot: {:?}", snapshot);
        assert_eq!(snapshot.dropped_by_backpressure, 2);
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_stops_worker() {
        let h = harness(30);
        h.cancel.cancel();
        // Requests after teardown are never processed
        h.counters.record_scheduled();
        h.mailbox.put(request(1, "ignored"));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(h.published.lock().is_empty());
        let snapshot = h.counters.snapshot(0);
        assert_eq!(snapshot.committed_updates, 0);
        assert_eq!(snapshot.uncommitted_updates, 1);
    }
}
