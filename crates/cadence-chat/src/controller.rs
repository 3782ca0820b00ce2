//! Response lifecycle controller.
//!
//! Orchestrates one send-receive cycle end to end: drives the session's
//! snapshot stream, feeds the markup accumulator, schedules debounced
//! renders, applies the size guardrails, performs the one-shot final render,
//! and applies the error/partial-preservation policy.
//!
//! Concurrency model: all mutable state (message list, streamed content,
//! session handle) lives behind one short-lived lock, never held across a
//! suspension point. Cancellation is cooperative — user actions bump epoch
//! counters and cancel tokens, and a cancelled cycle may keep running
//! internally but re-checks its captured epochs before every externally
//! visible side effect, no-oping silently when stale. Nothing ever blocks
//! on background-task teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use cadence_markup::{MarkupAccumulator, MarkupDocument, Renderer, StyledText};
use cadence_session::{Session, SessionFactory};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;

use crate::config::ChatConfig;
use crate::error::ErrorKind;
use crate::events::ChatEvent;
use crate::message::{Message, Role};
use crate::telemetry::{RenderCounters, TelemetrySnapshot};
use crate::worker::{RenderMailbox, RenderRequest, spawn_render_worker};

type PromptTransform = dyn Fn(&str) -> String + Send + Sync;

/// The chat runtime's public face: owns the conversation and runs one
/// response cycle at a time.
#[derive(Clone)]
pub struct ChatController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ChatConfig,
    factory: Arc<dyn SessionFactory>,
    renderer: Arc<dyn Renderer>,
    state: Mutex<ChatState>,
    /// Bumped on every send begin and on clear; a cycle's background work is
    /// authoritative only while its captured value matches.
    send_epoch: AtomicU64,
    /// Bumped on clear; every cycle-side read/write checks it first.
    response_epoch: AtomicU64,
    /// Bumped when a render is scheduled and when the render pipeline is
    /// torn down or restarted.
    render_epoch: Arc<AtomicU64>,
    is_generating: AtomicBool,
    idle_notify: Notify,
    event_tx: broadcast::Sender<ChatEvent>,
    prompt_transform: Mutex<Option<Arc<PromptTransform>>>,
}

#[derive(Default)]
struct ChatState {
    messages: Vec<Message>,
    session: Option<Arc<dyn Session>>,
    streamed_content: String,
    streamed_rendered: Option<StyledText>,
    last_error: Option<ErrorKind>,
    last_telemetry: Option<TelemetrySnapshot>,
    cycle: Option<CycleGuard>,
}

/// Cancellation handles for the in-flight cycle
struct CycleGuard {
    cancel: CancellationToken,
    worker_cancel: CancellationToken,
}

impl ChatController {
    /// Create a controller. The session factory and renderer are resolved
    /// once here and never inspected again at call sites.
    pub fn new(
        config: ChatConfig,
        factory: Arc<dyn SessionFactory>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(ControllerInner {
                config,
                factory,
                renderer,
                state: Mutex::new(ChatState::default()),
                send_epoch: AtomicU64::new(0),
                response_epoch: AtomicU64::new(0),
                render_epoch: Arc::new(AtomicU64::new(0)),
                is_generating: AtomicBool::new(false),
                idle_notify: Notify::new(),
                event_tx,
                prompt_transform: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to chat events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Set a hook that enriches the outgoing prompt (e.g. with user-activity
    /// context) before it reaches the session.
    pub fn set_prompt_transform(&self, f: impl Fn(&str) -> String + Send + Sync + 'static) {
        *self.inner.prompt_transform.lock() = Some(Arc::new(f));
    }

    /// Remove the prompt hook
    pub fn clear_prompt_transform(&self) {
        *self.inner.prompt_transform.lock() = None;
    }

    /// Snapshot of the conversation
    pub fn messages(&self) -> Vec<Message> {
        self.inner.state.lock().messages.clone()
    }

    /// Whether a response cycle is running
    pub fn is_generating(&self) -> bool {
        self.inner.is_generating.load(Ordering::Acquire)
    }

    /// Raw content streamed so far in the current cycle
    pub fn current_streamed_content(&self) -> String {
        self.inner.state.lock().streamed_content.clone()
    }

    /// Styled render of the streamed content. May lag the raw content under
    /// backpressure.
    pub fn current_streamed_rendered_content(&self) -> Option<StyledText> {
        self.inner.state.lock().streamed_rendered.clone()
    }

    /// The most recent cycle failure, if any
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.inner.state.lock().last_error.clone()
    }

    /// Telemetry for the most recently completed cycle
    pub fn last_telemetry(&self) -> Option<TelemetrySnapshot> {
        self.inner.state.lock().last_telemetry.clone()
    }

    /// Wait until no response cycle is running
    pub async fn wait_for_idle(&self) {
        let notified = self.inner.idle_notify.notified();
        if !self.inner.is_generating.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }

    /// Send a user message and start a response cycle.
    ///
    /// A no-op while a cycle is already running or when the text is blank.
    pub fn send(&self, text: &str) {
        let inner = &self.inner;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }

        let prompt = match inner.prompt_transform.lock().as_ref() {
            Some(transform) => transform(trimmed),
            None => trimmed.to_string(),
        };

        let cancel = CancellationToken::new();
        let worker_cancel = CancellationToken::new();
        let message = Message::user(trimmed);

        // Claiming the generating flag, capturing epochs, and appending the
        // user message happen under one lock so `clear_conversation` cannot
        // interleave with the start of a cycle.
        let (send_epoch, response_epoch) = {
            let mut state = inner.state.lock();
            if inner.is_generating.swap(true, Ordering::AcqRel) {
                tracing::debug!("send ignored: a response cycle is already running");
                return;
            }
            let send_epoch = inner.send_epoch.fetch_add(1, Ordering::AcqRel) + 1;
            let response_epoch = inner.response_epoch.load(Ordering::Acquire);
            state.messages.push(message.clone());
            state.last_error = None;
            state.streamed_content.clear();
            state.streamed_rendered = None;
            state.cycle = Some(CycleGuard {
                cancel: cancel.clone(),
                worker_cancel: worker_cancel.clone(),
            });
            (send_epoch, response_epoch)
        };
        let _ = inner.event_tx.send(ChatEvent::MessageAppended { message });
        let _ = inner.event_tx.send(ChatEvent::CycleStarted);

        tokio::spawn(run_cycle(
            Arc::clone(inner),
            prompt,
            send_epoch,
            response_epoch,
            cancel,
            worker_cancel,
        ));
    }

    /// Clear the conversation and cancel any in-flight cycle.
    ///
    /// Teardown is never waited on: epochs are bumped so the cycle's
    /// unwinding background work no-ops, however long it takes.
    pub fn clear_conversation(&self) {
        let inner = &self.inner;
        {
            // Epoch bumps happen under the state lock so no epoch-guarded
            // publish can interleave with the reset.
            let mut state = inner.state.lock();
            inner.send_epoch.fetch_add(1, Ordering::AcqRel);
            inner.response_epoch.fetch_add(1, Ordering::AcqRel);
            inner.render_epoch.fetch_add(1, Ordering::AcqRel);
            if let Some(cycle) = state.cycle.take() {
                cycle.cancel.cancel();
                cycle.worker_cancel.cancel();
            }
            state.messages.clear();
            state.streamed_content.clear();
            state.streamed_rendered = None;
            state.last_error = None;
            state.last_telemetry = None;
            inner.is_generating.store(false, Ordering::Release);
        }
        let _ = inner.event_tx.send(ChatEvent::Cleared);
        inner.idle_notify.notify_waiters();
    }

    /// Remove the trailing user/assistant pair and resend the user text.
    /// A no-op while a cycle is running or when there is nothing to retry.
    pub fn retry_last_message(&self) {
        if self.inner.is_generating.load(Ordering::Acquire) {
            tracing::debug!("retry ignored: a response cycle is already running");
            return;
        }
        let text = {
            let mut state = self.inner.state.lock();
            let messages = &mut state.messages;
            let last_role = messages.last().map(|m| m.role);
            let prior_role = messages.len().checked_sub(2).map(|i| messages[i].role);
            match (prior_role, last_role) {
                (Some(Role::User), Some(Role::Assistant)) => {
                    messages.pop();
                    messages.pop().map(|m| m.content)
                }
                (_, Some(Role::User)) => messages.pop().map(|m| m.content),
                _ => None,
            }
        };
        if let Some(text) = text {
            self.send(&text);
        }
    }

    /// Replace the session with a freshly created one. The in-flight cycle,
    /// if any, keeps the session it captured.
    pub fn refresh_session(&self) -> Result<(), ErrorKind> {
        match self.inner.factory.create(&self.inner.config.instructions) {
            Ok(session) => {
                self.inner.state.lock().session = Some(session);
                Ok(())
            }
            Err(e) => {
                let kind = ErrorKind::classify(&e);
                self.inner.state.lock().last_error = Some(kind.clone());
                Err(kind)
            }
        }
    }
}

/// One full send-receive cycle, running as a background task.
async fn run_cycle(
    inner: Arc<ControllerInner>,
    prompt: String,
    send_epoch: u64,
    response_epoch: u64,
    cancel: CancellationToken,
    worker_cancel: CancellationToken,
) {
    // Resolve the session, creating it on first use
    let session = {
        let existing = inner.state.lock().session.clone();
        match existing {
            Some(session) => session,
            None => match inner.factory.create(&inner.config.instructions) {
                Ok(session) => {
                    inner.state.lock().session = Some(Arc::clone(&session));
                    session
                }
                Err(e) => {
                    let counters = RenderCounters::new();
                    fail_without_partial(
                        &inner,
                        send_epoch,
                        response_epoch,
                        &counters,
                        ErrorKind::classify(&e),
                    );
                    return;
                }
            },
        }
    };

    let mut stream = match session.stream(&prompt, cancel.clone()).await {
        Ok(stream) => stream,
        Err(e) => {
            let counters = RenderCounters::new();
            fail_without_partial(
                &inner,
                send_epoch,
                response_epoch,
                &counters,
                ErrorKind::classify(&e),
            );
            return;
        }
    };

    let counters = Arc::new(RenderCounters::new());
    let mailbox = Arc::new(RenderMailbox::default());

    // Restarting the pipeline invalidates anything a previous worker still
    // had past its pre-render check.
    inner.render_epoch.fetch_add(1, Ordering::AcqRel);

    let publish_inner = Arc::clone(&inner);
    let _worker = spawn_render_worker(
        Arc::clone(&mailbox),
        Arc::clone(&inner.renderer),
        Arc::clone(&inner.render_epoch),
        Arc::clone(&counters),
        inner.config.render_debounce(),
        worker_cancel.clone(),
        move |epoch, styled| publish_render(&publish_inner, epoch, response_epoch, styled),
    );

    let mut accumulator = MarkupAccumulator::new();
    let mut last_snapshot = String::new();
    let mut live_parse_disabled = false;
    let mut failure: Option<ErrorKind> = None;

    while let Some(item) = stream.next().await {
        // Stop promptly once the cycle is no longer current
        if inner.response_epoch.load(Ordering::Acquire) != response_epoch
            || cancel.is_cancelled()
        {
            counters.record_terminated_input_yield();
            break;
        }

        let snapshot = match item {
            Ok(snapshot) => snapshot,
            Err(e) => {
                failure = Some(ErrorKind::classify(&e));
                break;
            }
        };

        // Backends occasionally re-emit an unchanged snapshot
        if snapshot == last_snapshot {
            continue;
        }
        last_snapshot = snapshot;

        {
            let mut state = inner.state.lock();
            if inner.response_epoch.load(Ordering::Acquire) != response_epoch {
                break;
            }
            state.streamed_content.clear();
            state.streamed_content.push_str(&last_snapshot);
        }
        let _ = inner.event_tx.send(ChatEvent::StreamContent {
            content: last_snapshot.clone(),
        });

        if !live_parse_disabled && last_snapshot.len() > inner.config.live_markup_ceiling {
            live_parse_disabled = true;
            accumulator.reset();
            // Invalidate anything already scheduled and drop the styled
            // view; the raw text is what stays on display.
            inner.render_epoch.fetch_add(1, Ordering::AcqRel);
            {
                let mut state = inner.state.lock();
                if inner.response_epoch.load(Ordering::Acquire) == response_epoch {
                    state.streamed_rendered = None;
                }
            }
            tracing::warn!(
                length = last_snapshot.len(),
                ceiling = inner.config.live_markup_ceiling,
                "live markup ceiling exceeded, rendering raw text for the rest of this cycle"
            );
        }

        if !live_parse_disabled {
            if let Some(document) = accumulator.ingest(&last_snapshot) {
                schedule_render(&inner, &mailbox, &counters, document);
            }
        }
    }

    // Tear down the worker before the final render: stop intake and cancel
    // the loop.
    worker_cancel.cancel();

    // A cancelled cycle exits silently; whoever cancelled owns the state
    // (and already bumped the epochs).
    if inner.response_epoch.load(Ordering::Acquire) != response_epoch || cancel.is_cancelled() {
        return;
    }

    // Bump the epoch so a request already past its pre-render check is
    // still caught by the post-render check.
    inner.render_epoch.fetch_add(1, Ordering::AcqRel);

    let response_length = last_snapshot.len();
    let (message, last_error) = match failure {
        Some(kind) => {
            if !last_snapshot.trim().is_empty() && kind.preserves_partial_text() {
                // Recoverable: keep the partial the user already saw and
                // annotate it inline.
                let rendered =
                    final_render(&inner, &accumulator, &last_snapshot, live_parse_disabled);
                (
                    Message::assistant_with_error(
                        last_snapshot.clone(),
                        Some(rendered),
                        kind.clone(),
                    ),
                    Some(kind),
                )
            } else {
                let content = inner.config.fallback.generic.clone();
                let rendered = StyledText::plain(&content);
                (Message::assistant(content, Some(rendered)), Some(kind))
            }
        }
        None => {
            if last_snapshot.trim().is_empty() {
                let content = inner.config.fallback.empty_response.clone();
                let rendered = StyledText::plain(&content);
                (
                    Message::assistant(content, Some(rendered)),
                    Some(ErrorKind::InvalidResponse),
                )
            } else {
                let rendered =
                    final_render(&inner, &accumulator, &last_snapshot, live_parse_disabled);
                (
                    Message::assistant(last_snapshot.clone(), Some(rendered)),
                    None,
                )
            }
        }
    };

    finish_cycle(
        &inner,
        send_epoch,
        response_epoch,
        &counters,
        response_length,
        Some(message),
        last_error,
    );
}

/// Schedule a render of `document` under a fresh render epoch.
fn schedule_render(
    inner: &ControllerInner,
    mailbox: &RenderMailbox,
    counters: &RenderCounters,
    document: MarkupDocument,
) {
    counters.record_scheduled();
    let epoch = inner.render_epoch.fetch_add(1, Ordering::AcqRel) + 1;
    if mailbox.put(RenderRequest { epoch, document }) {
        counters.record_dropped_by_backpressure();
    }
}

/// Post-render publish: commits the styled text only while the request is
/// still current. Runs under the state lock so `clear_conversation` cannot
/// interleave between the check and the write.
fn publish_render(
    inner: &Arc<ControllerInner>,
    epoch: u64,
    response_epoch: u64,
    styled: StyledText,
) -> bool {
    {
        let mut state = inner.state.lock();
        if inner.render_epoch.load(Ordering::Acquire) != epoch
            || inner.response_epoch.load(Ordering::Acquire) != response_epoch
        {
            return false;
        }
        state.streamed_rendered = Some(styled.clone());
    }
    let _ = inner
        .event_tx
        .send(ChatEvent::StreamRendered { rendered: styled });
    true
}

/// The one-shot final render, off the hot path. Above the final ceiling the
/// parse is skipped entirely and the raw text is wrapped verbatim.
fn final_render(
    inner: &ControllerInner,
    accumulator: &MarkupAccumulator,
    content: &str,
    live_parse_disabled: bool,
) -> StyledText {
    if content.len() > inner.config.final_markup_ceiling {
        tracing::debug!(
            length = content.len(),
            ceiling = inner.config.final_markup_ceiling,
            "final markup ceiling exceeded, skipping parse"
        );
        return StyledText::plain(content);
    }
    let document = if live_parse_disabled || accumulator.source() != content {
        MarkupDocument::parse(content)
    } else {
        accumulator.finalize()
    };
    inner.renderer.render(&document)
}

/// Terminal failure before any content streamed
fn fail_without_partial(
    inner: &Arc<ControllerInner>,
    send_epoch: u64,
    response_epoch: u64,
    counters: &RenderCounters,
    kind: ErrorKind,
) {
    let content = inner.config.fallback.generic.clone();
    let rendered = StyledText::plain(&content);
    finish_cycle(
        inner,
        send_epoch,
        response_epoch,
        counters,
        0,
        Some(Message::assistant(content, Some(rendered))),
        Some(kind),
    );
}

/// Apply a cycle's terminal state: append the assistant message, reset the
/// live-stream fields, publish telemetry, and return to idle. Everything is
/// epoch-guarded, so a cycle that lost a race with `clear_conversation`
/// changes nothing.
fn finish_cycle(
    inner: &Arc<ControllerInner>,
    send_epoch: u64,
    response_epoch: u64,
    counters: &RenderCounters,
    response_length: usize,
    message: Option<Message>,
    last_error: Option<ErrorKind>,
) {
    let snapshot = counters.snapshot(response_length);
    {
        let mut state = inner.state.lock();
        if inner.response_epoch.load(Ordering::Acquire) != response_epoch {
            return;
        }
        if let Some(message) = &message {
            state.messages.push(message.clone());
        }
        state.streamed_content.clear();
        state.streamed_rendered = None;
        state.last_error = last_error.clone();
        state.last_telemetry = Some(snapshot.clone());
        state.cycle = None;
    }

    if let Some(message) = message {
        let _ = inner.event_tx.send(ChatEvent::MessageAppended { message });
    }
    let _ = inner.event_tx.send(ChatEvent::CycleFinished {
        telemetry: snapshot.clone(),
        error: last_error.clone(),
    });

    let fingerprint = last_error.as_ref().and_then(|k| k.internal_fingerprint());
    tracing::info!(
        scheduled = snapshot.scheduled_updates,
        committed = snapshot.committed_updates,
        stale_before = snapshot.stale_discarded_before_render,
        stale_after = snapshot.stale_discarded_after_render,
        dropped = snapshot.dropped_by_backpressure,
        uncommitted = snapshot.uncommitted_updates,
        terminated_yields = snapshot.terminated_input_yields,
        response_length = snapshot.response_length,
        error = last_error.as_ref().map(|k| k.tag()),
        fingerprint = fingerprint.as_deref(),
        "response cycle finished"
    );
    if snapshot.dropped_by_backpressure > snapshot.committed_updates {
        tracing::warn!(
            dropped = snapshot.dropped_by_backpressure,
            committed = snapshot.committed_updates,
            "render backpressure dropped more updates than were committed"
        );
    }

    if inner.send_epoch.load(Ordering::Acquire) == send_epoch {
        inner.is_generating.store(false, Ordering::Release);
    }
    inner.idle_notify.notify_waiters();
}
