//! Lifecycle controller: summary states, commands and the state machine.

mod builder;
mod command;
mod core;
mod state;

pub use builder::ControllerBuilder;
pub use command::{Ack, Command};
pub use self::core::{Controller, ControllerHandle, INGEST_LOOP_DIED, SIMULATION_LOOP_DIED};
pub use state::{SimulationMode, State};
