//! # dsm-controller
//!
//! Lifecycle controller for a dome seeing monitor (DSM).
//!
//! A command-driven state machine gates two background loops: one ingesting the
//! telemetry files the instrument writes into a directory, one generating
//! synthetic files on a timer when running in simulation. The controller keeps
//! both loops in lock-step with its state, provisions and tears down the telemetry
//! directory, and publishes every record on a broadcast bus.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     commands (ControllerHandle / execute)
//!                    │
//!                    ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Controller (state machine)                                       │
//! │  - SettingsSource   (settings label ─► Settings)                  │
//! │  - DirectoryManager (simulation temp dir / external dir)          │
//! │  - DirectoryWatch   (register / unregister around ENABLED)        │
//! │  - LoopSupervisor × 2                                             │
//! └──────┬─────────────────────────────────────┬──────────────────────┘
//!        ▼                                     ▼
//!  ┌──────────────────┐                 ┌──────────────────┐
//!  │  IngestLoop      │  ◄── files ──── │  SimulationLoop  │
//!  │ (watch stream)   │                 │  (tick period)   │
//!  └──────┬───────────┘                 └──────────────────┘
//!         │ configuration / domeSeeing
//!         ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │  summaryState, settingsApplied, heartbeat, errorCode, loop events │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                         listener ─► SubscriberSet
//!                                  ┌─────────┼─────────┐
//!                                  ▼         ▼         ▼
//!                              LogWriter  transport  custom
//! ```
//!
//! ### States
//! ```text
//! STANDBY --start--> DISABLED --enable--> ENABLED
//! ENABLED --disable--> DISABLED --standby--> STANDBY
//! STANDBY --exitControl--> OFFLINE (terminal)
//! any --fault--> FAULT --standby--> STANDBY
//! ```
//!
//! | State    | Ingestion loop | Simulation loop (simulated modes) |
//! |----------|----------------|-----------------------------------|
//! | STANDBY  | stopped        | stopped                           |
//! | DISABLED | stopped        | stopped                           |
//! | ENABLED  | running        | running                           |
//! | FAULT    | stopped        | stopped                           |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], rendering bus events through `tracing`.
//!
//! ## Example
//! ```rust
//! use dsm_controller::{ChannelWatcher, Command, Config, ControllerBuilder, State, StaticSettings};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut ctrl = ControllerBuilder::new(Config::default())
//!         .with_simulation_mode(1)
//!         .with_settings(StaticSettings::new())
//!         .with_watcher(ChannelWatcher::new())
//!         .build()?;
//!
//!     assert!(ctrl.execute(Command::start("simulation")).await.is_complete());
//!     assert!(ctrl.execute(Command::Enable).await.is_complete());
//!     assert!(ctrl.simulation_active());
//!
//!     // disable ─► standby ─► exitControl
//!     ctrl.shutdown().await;
//!     assert_eq!(ctrl.state(), State::Offline);
//!     Ok(())
//! }
//! ```
pub mod config;
pub mod controller;
pub mod core;
pub mod error;
pub mod events;
pub mod subscribers;
pub mod tasks;
pub mod telemetry;

// ---- Public re-exports ----

pub use config::{Config, FileSettings, Settings, SettingsSource, StaticSettings, TELEMETRY_DIR_ENV};
pub use controller::{
    Ack, Command, Controller, ControllerBuilder, ControllerHandle, SimulationMode, State,
    INGEST_LOOP_DIED, SIMULATION_LOOP_DIED,
};
pub use crate::core::{wait_for_shutdown_signal, LoopExit, LoopSupervisor};
pub use error::{ControllerError, LoopError, ParseError};
pub use events::{Bus, Event, EventKind, Payload};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{Task, TaskFn, TaskRef};
pub use telemetry::{
    convert_time, ChannelWatcher, ConfigurationRecord, DirectoryManager, DirectoryWatch,
    DomeSeeingRecord, FileEvent, NotifyWatcher, SettingsApplied,
};

// Enable with: `--features logging` (on by default)
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
