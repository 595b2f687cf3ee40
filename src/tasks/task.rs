//! # Loop body abstraction.
//!
//! A [`Task`] is the body of one background loop: it receives a
//! [`CancellationToken`] and runs until it completes, fails, or observes
//! cancellation. The common handle type is [`TaskRef`], an `Arc<dyn Task>`
//! suitable for handing to a [`LoopSupervisor`](crate::LoopSupervisor).

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::LoopError;

/// Shared handle to a loop body.
pub type TaskRef = Arc<dyn Task>;

/// # Asynchronous, cancelable loop body.
///
/// Implementors must suspend only at points where the token is observed
/// (`select!` on `ctx.cancelled()`), so that cancellation is immediate.
///
/// # Example
/// ```
/// use tokio_util::sync::CancellationToken;
/// use async_trait::async_trait;
/// use dsm_controller::{LoopError, Task};
///
/// struct Idle;
///
/// #[async_trait]
/// impl Task for Idle {
///     fn name(&self) -> &str { "idle" }
///
///     async fn run(&self, ctx: CancellationToken) -> Result<(), LoopError> {
///         ctx.cancelled().await;
///         Err(LoopError::Canceled)
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Returns a stable, human-readable loop name.
    fn name(&self) -> &str;

    /// Runs the loop until completion or cancellation.
    ///
    /// Return `Err(LoopError::Canceled)` when stopping because of `ctx`.
    async fn run(&self, ctx: CancellationToken) -> Result<(), LoopError>;
}
