//! Telemetry: records, file formats, the working directory and the two loops.
//!
//! - [`record`]: record model and time conversion;
//! - [`parser`]: configuration (YAML) and data (CSV) file parsing;
//! - [`generator`]: synthetic files for simulation modes;
//! - [`directory`]: telemetry directory allocation and cleanup;
//! - [`watcher`]: "file closed for writing" notifications;
//! - [`ingest`] / [`simulation`]: loop bodies run under a [`crate::LoopSupervisor`].

pub mod directory;
pub mod generator;
pub mod ingest;
pub mod parser;
pub mod record;
pub mod simulation;
pub mod watcher;

pub use directory::{DirectoryManager, Provenance};
pub use generator::{create_telemetry_config, create_telemetry_data, CameraProfile, CONFIG_FILE_NAME};
pub use ingest::{IngestLoop, INGEST_LOOP};
pub use parser::{parse_configuration, parse_data};
pub use record::{
    convert_time, to_file_uri, ConfigurationRecord, DomeSeeingRecord, FileKind, SettingsApplied,
    TAI_OFFSET_SECONDS,
};
pub use simulation::{SimulationLoop, SIMULATION_LOOP};
pub use watcher::{
    ChannelWatcher, DirectoryWatch, FileEvent, FileEventSender, FileEvents, NotifyWatcher,
};
