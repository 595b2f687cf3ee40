//! # Run one loop body to completion.
//!
//! Executes a [`Task`] with its cancellation token and publishes exactly one
//! terminal event to the [`Bus`].
//!
//! ## Event flow
//!
//! ```text
//! Completion:
//!   task.run() → Ok(())           → publish LoopStopped  → LoopExit::Completed
//!
//! Cancellation:
//!   task.run() → Err(Canceled)    → publish LoopStopped  → LoopExit::Cancelled
//!
//! Failure:
//!   task.run() → Err(Fatal)       → publish LoopFailed   → LoopExit::Failed
//! ```
//!
//! ## Rules
//! - `Canceled` is a graceful exit, never reported as a failure
//! - Failures are logged here and end the loop; they never propagate further

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{
    error::LoopError,
    events::{Bus, Event, EventKind},
    tasks::TaskRef,
};

/// How a supervised loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// No loop was running.
    Idle,
    /// The body returned `Ok(())`.
    Completed,
    /// The body observed cancellation.
    Cancelled,
    /// The body returned an error other than cancellation.
    Failed(String),
    /// The body panicked.
    Panicked(String),
    /// The body ignored cancellation past the die timeout and was aborted.
    Forced,
}

/// Runs `task` until it returns, publishing its terminal event.
pub(crate) async fn run_loop(task: TaskRef, token: CancellationToken, bus: Bus) -> LoopExit {
    match task.run(token).await {
        Ok(()) => {
            debug!(task = task.name(), "loop completed");
            publish_stopped(&bus, task.name());
            LoopExit::Completed
        }
        Err(LoopError::Canceled) => {
            debug!(task = task.name(), "loop cancelled");
            publish_stopped(&bus, task.name());
            LoopExit::Cancelled
        }
        Err(e) => {
            error!(task = task.name(), label = e.as_label(), error = %e, "loop terminated");
            bus.publish(
                Event::new(EventKind::LoopFailed)
                    .with_source(task.name())
                    .with_reason(e.as_message()),
            );
            LoopExit::Failed(e.as_message())
        }
    }
}

fn publish_stopped(bus: &Bus, name: &str) {
    bus.publish(Event::new(EventKind::LoopStopped).with_source(name));
}
