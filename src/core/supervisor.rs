//! # LoopSupervisor: owns one cancellable background loop.
//!
//! Replaces `*_loop_running` flags with the real status of the spawned task:
//! "active" is read straight from the [`JoinHandle`], so the flag and the task
//! can never diverge.
//!
//! ## Lifecycle
//! ```text
//! ensure_started(factory)
//!   ├─ active?  ──► no-op (never a second copy)
//!   └─ idle     ──► factory() ─► child token ─► tokio::spawn(run_loop)
//!                                                     │
//! cancel_and_wait(timeout)                            ▼
//!   ├─► token.cancel()                         body observes token
//!   ├─► await join, bounded by `timeout`
//!   │      ├─ joined     ──► LoopExit (Cancelled / Completed / Failed / Panicked)
//!   │      └─ timed out  ──► join.abort() ─► publish LoopForced ─► LoopExit::Forced
//!   └─► never returns an error: the caller's transition always proceeds
//! ```
//!
//! The aborted task is not awaited: abort only lands at its next await point,
//! and a body stuck in synchronous code must not hold up the caller.
//!
//! ## Rules
//! - At most one task per supervisor is ever active.
//! - Dropping the supervisor cancels and aborts its task.

use std::borrow::Cow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::runner::{run_loop, LoopExit};
use crate::events::{Bus, Event, EventKind};
use crate::tasks::TaskRef;

/// Handle to a spawned loop.
struct Handle {
    join: JoinHandle<LoopExit>,
    cancel: CancellationToken,
}

/// Owns a single cancellable background loop.
pub struct LoopSupervisor {
    name: Cow<'static, str>,
    bus: Bus,
    handle: Option<Handle>,
    spawned: u64,
}

impl LoopSupervisor {
    pub fn new(name: impl Into<Cow<'static, str>>, bus: Bus) -> Self {
        Self {
            name: name.into(),
            bus,
            handle: None,
            spawned: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True iff a loop was started and has neither completed nor been cancelled.
    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| !h.join.is_finished())
    }

    /// Number of tasks this supervisor has spawned over its lifetime.
    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    /// Spawns a loop built by `factory` unless one is already active.
    ///
    /// Returns `true` if a new task was spawned. `factory` is not called when
    /// the loop is already active.
    pub fn ensure_started<F>(&mut self, factory: F) -> bool
    where
        F: FnOnce() -> TaskRef,
    {
        if self.is_active() {
            debug!(supervisor = %self.name, "loop already active");
            return false;
        }

        let task = factory();
        let cancel = CancellationToken::new();
        self.bus
            .publish(Event::new(EventKind::LoopStarted).with_source(task.name()));
        info!(supervisor = %self.name, task = task.name(), "starting loop");

        let join = tokio::spawn(run_loop(task, cancel.clone(), self.bus.clone()));
        self.handle = Some(Handle { join, cancel });
        self.spawned += 1;
        true
    }

    /// Requests cancellation and waits up to `timeout` for the loop to finish.
    ///
    /// On timeout the task is aborted. Failures are logged and reported in the
    /// returned [`LoopExit`], never raised.
    pub async fn cancel_and_wait(&mut self, timeout: Duration) -> LoopExit {
        let Some(Handle { mut join, cancel }) = self.handle.take() else {
            return LoopExit::Idle;
        };
        cancel.cancel();

        match tokio::time::timeout(timeout, &mut join).await {
            Ok(Ok(exit)) => {
                info!(supervisor = %self.name, exit = ?exit, "loop shut down");
                exit
            }
            Ok(Err(join_err)) => {
                let reason = if join_err.is_panic() {
                    "loop panicked"
                } else {
                    "loop aborted"
                };
                error!(supervisor = %self.name, error = %join_err, "{reason}");
                self.bus.publish(
                    Event::new(EventKind::LoopFailed)
                        .with_source(self.name.clone().into_owned())
                        .with_reason(reason),
                );
                LoopExit::Panicked(join_err.to_string())
            }
            Err(_elapsed) => {
                join.abort();
                warn!(supervisor = %self.name, ?timeout, "loop ignored cancellation; aborted");
                self.bus.publish(
                    Event::new(EventKind::LoopForced)
                        .with_source(self.name.clone().into_owned())
                        .with_timeout(timeout),
                );
                LoopExit::Forced
            }
        }
    }
}

impl Drop for LoopSupervisor {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            h.cancel.cancel();
            h.join.abort();
        }
    }
}
