//! Per-cycle render telemetry.
//!
//! Counters are passive bookkeeping: the controller and the render worker
//! record into them, and a snapshot is published exactly once per completed
//! cycle. `uncommitted_updates` is derived, not counted — it covers both the
//! request still sitting in the mailbox and requests silently replaced
//! there; the only guarantees are the conservation law checked below.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters for one response cycle, shared with the render worker.
#[derive(Debug, Default)]
pub struct RenderCounters {
    scheduled_updates: AtomicU64,
    committed_updates: AtomicU64,
    stale_before_render: AtomicU64,
    stale_after_render: AtomicU64,
    dropped_by_backpressure: AtomicU64,
    terminated_input_yields: AtomicU64,
}

impl RenderCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_scheduled(&self) {
        self.scheduled_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_committed(&self) {
        self.committed_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_before_render(&self) {
        self.stale_before_render.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_after_render(&self) {
        self.stale_after_render.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_by_backpressure(&self) {
        self.dropped_by_backpressure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_terminated_input_yield(&self) {
        self.terminated_input_yields.fetch_add(1, Ordering::Relaxed);
    }

    /// Publishable snapshot of the counters for a finished cycle.
    pub fn snapshot(&self, response_length: usize) -> TelemetrySnapshot {
        let scheduled = self.scheduled_updates.load(Ordering::Relaxed);
        let committed = self.committed_updates.load(Ordering::Relaxed);
        let stale_before = self.stale_before_render.load(Ordering::Relaxed);
        let stale_after = self.stale_after_render.load(Ordering::Relaxed);
        TelemetrySnapshot {
            scheduled_updates: scheduled,
            committed_updates: committed,
            stale_discarded_before_render: stale_before,
            stale_discarded_after_render: stale_after,
            dropped_by_backpressure: self.dropped_by_backpressure.load(Ordering::Relaxed),
            terminated_input_yields: self.terminated_input_yields.load(Ordering::Relaxed),
            uncommitted_updates: scheduled
                .saturating_sub(committed + stale_before + stale_after),
            response_length,
        }
    }
}

/// Telemetry for one completed response cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub scheduled_updates: u64,
    pub committed_updates: u64,
    pub stale_discarded_before_render: u64,
    pub stale_discarded_after_render: u64,
    pub dropped_by_backpressure: u64,
    pub terminated_input_yields: u64,
    /// Derived: scheduled minus everything accounted for above
    pub uncommitted_updates: u64,
    pub response_length: usize,
}

impl TelemetrySnapshot {
    /// Every scheduled update must be committed, discarded as stale, or
    /// still unaccounted for; replaced mailbox entries are a subset of the
    /// unaccounted ones.
    pub fn is_conserved(&self) -> bool {
        self.scheduled_updates
            == self.committed_updates
                + self.stale_discarded_before_render
                + self.stale_discarded_after_render
                + self.uncommitted_updates
            && self.dropped_by_backpressure <= self.uncommitted_updates
    }
}
