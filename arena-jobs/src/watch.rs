//! Watch state machine
//!
//! Reduces the event stream of one workload to a terminal result:
//! - the caller's desired-state predicate matches: success
//! - the workload failed, was deleted, or the stream errored: failure
//! - anything else: keep waiting
//!
//! A stream the backend ends normally is re-opened. There is no timeout
//! here. Callers that need a deadline wrap the call or
//! cancel the token they pass in.

use arena_core::domain::watch::{EventKind, Phase, WatchEvent};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{JobError, Result};

/// Capacity of the channel between a pump task and its watcher
pub const WATCH_CHANNEL_CAPACITY: usize = 64;

/// An open event stream for a single workload
///
/// Events are produced by a background pump task that owns the backend
/// connection (HTTP response body, child process). Dropping the subscription
/// aborts the task, which releases that connection.
pub struct Subscription {
    name: String,
    events: mpsc::Receiver<WatchEvent>,
    pump: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Creates a subscription fed by the given pump task
    pub fn new(
        name: impl Into<String>,
        events: mpsc::Receiver<WatchEvent>,
        pump: JoinHandle<()>,
    ) -> Self {
        Self {
            name: name.into(),
            events,
            pump: Some(pump),
        }
    }

    /// Creates a subscription over a bare channel
    pub fn from_receiver(name: impl Into<String>, events: mpsc::Receiver<WatchEvent>) -> Self {
        Self {
            name: name.into(),
            events,
            pump: None,
        }
    }

    /// Name of the watched workload
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the next event; `None` once the stream has ended
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
            debug!("Closed watch on {}", self.name);
        }
    }
}

/// Outcome of feeding one event to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Reached,
    Failed,
    Deleted,
    Errored,
    Continue,
}

/// Decides what a single event means for a watch
///
/// The desired-state check comes first so that a workload which reaches the
/// desired phase is never reported as failed by the same event.
pub fn step<F>(event: &WatchEvent, is_desired: F) -> Step
where
    F: Fn(&WatchEvent) -> bool,
{
    if is_desired(event) {
        Step::Reached
    } else if event.phase == Phase::Failed {
        Step::Failed
    } else if event.kind == EventKind::Deleted {
        Step::Deleted
    } else if event.kind == EventKind::Error {
        Step::Errored
    } else {
        Step::Continue
    }
}

/// Pause before re-opening a stream that closed without delivering anything
pub const RESUBSCRIBE_DELAY: Duration = Duration::from_millis(250);

/// Consecutive empty streams tolerated before the watch gives up
pub const MAX_EMPTY_STREAMS: u32 = 3;

/// Watches a workload until it reaches a terminal state
///
/// `open` is called for the first subscription and again every time the
/// backend ends a stream normally (API servers expire long watches), so a
/// watch survives reconnects and may observe the current state twice. Opening
/// is raced against `cancel` like every other wait.
///
/// Returns the event that satisfied `is_desired`.
pub async fn watch_until<O, Fut, F>(
    name: &str,
    mut open: O,
    is_desired: F,
    cancel: &CancellationToken,
) -> Result<WatchEvent>
where
    O: FnMut() -> Fut,
    Fut: Future<Output = Result<Subscription>>,
    F: Fn(&WatchEvent) -> bool,
{
    let mut last: Option<WatchEvent> = None;
    let mut empty_streams = 0;

    loop {
        if empty_streams > 0 {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(name)),
                _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
            }
        }

        let subscription = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(name)),
            subscription = open() => subscription?,
        };

        let received = match follow(subscription, &is_desired, cancel, &mut last).await? {
            Outcome::Reached(event) => return Ok(event),
            Outcome::Closed { received } => received,
        };

        if received == 0 {
            empty_streams += 1;
            if empty_streams >= MAX_EMPTY_STREAMS {
                return Err(JobError::WatchStream {
                    name: name.to_string(),
                    message: "event stream closed".to_string(),
                    snapshot: last.map(Box::new),
                });
            }
        } else {
            empty_streams = 0;
        }
        debug!("Event stream for {} ended, re-opening", name);
    }
}

/// How a single subscription ended without an error
#[derive(Debug)]
pub enum Outcome {
    /// The desired state was observed
    Reached(WatchEvent),
    /// The backend ended the stream after `received` non-terminal events
    Closed { received: usize },
}

/// Consumes one subscription
///
/// Non-terminal events are recorded in `last`. The subscription is dropped,
/// and its backend stream closed, before this function returns.
pub async fn follow<F>(
    mut subscription: Subscription,
    is_desired: &F,
    cancel: &CancellationToken,
    last: &mut Option<WatchEvent>,
) -> Result<Outcome>
where
    F: Fn(&WatchEvent) -> bool,
{
    let name = subscription.name().to_string();
    let mut received = 0;

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(&name)),
            event = subscription.next() => event,
        };

        let Some(event) = event else {
            return Ok(Outcome::Closed { received });
        };

        debug!(
            "Update received for {}, EventType {}, phase {}",
            name, event.kind, event.phase
        );

        match step(&event, is_desired) {
            Step::Reached => {
                info!("Reached desired state for {}", name);
                return Ok(Outcome::Reached(event));
            }
            Step::Failed => {
                return Err(JobError::WorkloadFailed {
                    name,
                    snapshot: Box::new(event),
                });
            }
            Step::Deleted => {
                return Err(JobError::WorkloadDeleted {
                    name,
                    snapshot: Box::new(event),
                });
            }
            Step::Errored => {
                // API server error events carry a Status object with a message
                let message = event
                    .snapshot
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("backend reported an error")
                    .to_string();
                return Err(JobError::WatchStream {
                    name,
                    message,
                    snapshot: Some(Box::new(event)),
                });
            }
            Step::Continue => {
                received += 1;
                *last = Some(event);
            }
        }
    }
}

fn cancelled(name: &str) -> JobError {
    debug!("Watch on {} cancelled", name);
    JobError::Cancelled {
        name: name.to_string(),
    }
}

/// Startup predicate: the workload is running
pub fn is_running(event: &WatchEvent) -> bool {
    event.phase == Phase::Running
}

/// Completion predicate: the workload finished successfully
pub fn is_succeeded(event: &WatchEvent) -> bool {
    event.phase == Phase::Succeeded
}

/// Predicate for backends that cannot detect the desired state
pub fn never(_event: &WatchEvent) -> bool {
    false
}
