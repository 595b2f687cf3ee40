//! Published events: records, loop lifecycle and the broadcast bus.
//!
//! This module groups the event **data model** and the **bus** that carries
//! records and runtime events out of the controller.
//!
//! ## Contents
//! - [`EventKind`], [`Event`], [`Payload`] event classification, metadata and records
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Controller` (summary state, settings, heartbeat, error code),
//!   the ingestion loop (configuration, dome seeing), `LoopSupervisor`
//!   (loop lifecycle), `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the transport side of the instrument, `SubscriberSet`
//!   (fan-out to `LogWriter` and user subscribers), tests.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind, Payload};
