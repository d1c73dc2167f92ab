//! Per-path debouncing and listener fan-out.
//!
//! Each watch target gets one task that collapses bursts of raw events
//! (e.g. write-to-temp, delete, rename) into a single notification.

use super::registry::ListenerSet;
use super::source::RawEvent;
use super::{Listener, Notification, WatchTarget};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

/// An open debounce window for one target.
#[derive(Debug)]
pub(crate) struct DebounceSession {
    deadline: Instant,
    raw_events: usize,
}

impl DebounceSession {
    pub(crate) fn open(window: Duration) -> Self {
        Self {
            deadline: Instant::now() + window,
            raw_events: 1,
        }
    }

    /// Push the deadline out for another raw event.
    pub(crate) fn extend(&mut self, window: Duration) {
        self.deadline = Instant::now() + window;
        self.raw_events += 1;
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    pub(crate) fn raw_events(&self) -> usize {
        self.raw_events
    }
}

/// Debounce loop for one target. Runs until the raw event channel closes.
pub(crate) async fn run(
    target: WatchTarget,
    mut events: mpsc::UnboundedReceiver<RawEvent>,
    listeners: Arc<ListenerSet>,
    window: Duration,
) {
    let mut session: Option<DebounceSession> = None;

    loop {
        let deadline = session.as_ref().map(DebounceSession::deadline);

        tokio::select! {
            event = events.recv() => match event {
                Some(RawEvent::Changed) => match session.as_mut() {
                    Some(open) => open.extend(window),
                    None => session = Some(DebounceSession::open(window)),
                },
                Some(RawEvent::Lost(reason)) => {
                    tracing::error!(path = %target, reason = %reason, "file watch lost");
                    dispatch(&target, &listeners, Notification::WatchLost { reason }).await;
                }
                None => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some(closed) = session.take() {
                    tracing::trace!(
                        path = %target,
                        raw_events = closed.raw_events(),
                        "debounce window closed"
                    );
                    dispatch(&target, &listeners, Notification::Modified).await;
                }
            }
        }
    }

    tracing::trace!(path = %target, "debounce task finished");
}

/// Deliver `notification` to the listeners registered right now.
async fn dispatch(target: &WatchTarget, listeners: &ListenerSet, notification: Notification) {
    let recipients = listeners.snapshot();
    if recipients.is_empty() {
        return;
    }

    let path = target.clone();
    let delivery =
        tokio::task::spawn_blocking(move || fan_out(&path, &recipients, &notification)).await;

    if let Err(e) = delivery {
        tracing::error!(path = %target, error = %e, "notification dispatch failed");
    }
}

/// Call every listener, isolating panics. Returns how many completed normally.
pub(crate) fn fan_out(
    target: &WatchTarget,
    recipients: &[Arc<dyn Listener>],
    notification: &Notification,
) -> usize {
    let mut delivered = 0;
    for listener in recipients {
        match catch_unwind(AssertUnwindSafe(|| listener.notify(notification))) {
            Ok(()) => delivered += 1,
            Err(_) => {
                tracing::error!(path = %target, ?notification, "change listener panicked");
            }
        }
    }
    delivered
}
