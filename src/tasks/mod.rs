//! # Loop bodies.
//!
//! - [`Task`] - trait for async cancelable loop bodies
//! - [`TaskFn`] - closure-backed implementation
//! - [`TaskRef`] - shared handle (`Arc<dyn Task>`)

mod task;
mod task_fn;

pub use task::{Task, TaskRef};
pub use task_fn::TaskFn;
