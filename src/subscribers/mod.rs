//! # Event subscribers.
//!
//! ```text
//! Controller / loops ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                                   │
//!                                                     ┌─────────────┼───────────┐
//!                                                     ▼             ▼           ▼
//!                                                 LogWriter    transport    custom
//! ```
//!
//! ## Implementing a subscriber
//! ```rust
//! use async_trait::async_trait;
//! use dsm_controller::{Event, EventKind, Subscribe};
//!
//! struct Archive;
//!
//! #[async_trait]
//! impl Subscribe for Archive {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::DomeSeeing {
//!             // append to archive...
//!         }
//!     }
//!     fn name(&self) -> &'static str { "archive" }
//! }
//! ```

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
