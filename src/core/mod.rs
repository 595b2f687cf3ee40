//! Loop supervision primitives.
//!
//! - [`supervisor`]: [`LoopSupervisor`], owns one cancellable loop (start idempotently,
//!   cancel with a bounded wait);
//! - [`runner`]: runs one loop body and publishes its terminal event;
//! - [`shutdown`]: cross-platform termination signal handling for the binary.

mod runner;
mod shutdown;
mod supervisor;

pub use runner::LoopExit;
pub use shutdown::wait_for_shutdown_signal;
pub use supervisor::LoopSupervisor;
