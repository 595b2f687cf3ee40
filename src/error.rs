//! Error types used by the controller, its loops and the telemetry parsers.
//!
//! This module defines three error enums:
//!
//! - [`ControllerError`]: errors raised while handling a command (rejected transitions,
//!   bad settings, bad simulation modes, directory and watch failures).
//! - [`LoopError`]: errors raised by a background loop body.
//! - [`ParseError`]: per-file / per-row failures while reading telemetry files.
//!
//! `ControllerError` and `LoopError` provide `as_label` / `as_message` helpers for
//! command acknowledgements and logs.

use std::path::PathBuf;

use thiserror::Error;

use crate::controller::State;

/// # Errors produced while handling a command.
///
/// Every variant is reported synchronously in the command acknowledgement; the
/// controller state is left unchanged when one of these is returned.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Command issued from a state that does not match its guard.
    #[error("command {command} not allowed in state {state}")]
    InvalidStateTransition {
        /// Name of the rejected command.
        command: &'static str,
        /// State the controller was in.
        state: State,
    },

    /// Settings label unknown or settings payload malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Simulation mode outside of the enumerated variants.
    #[error("invalid simulation mode {0}; expected one of 0, 1, 2")]
    InvalidMode(i64),

    /// Telemetry directory could not be provisioned or removed.
    #[error("telemetry directory {path:?}: {source}")]
    Directory {
        /// Directory involved.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Directory watch could not be registered.
    #[error("watch failed: {0}")]
    Watch(String),

    /// Command text that does not name a known command.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl ControllerError {
    /// Returns a short stable label (snake_case) for use in acks/logs.
    ///
    /// # Example
    /// ```
    /// use dsm_controller::ControllerError;
    ///
    /// let err = ControllerError::InvalidMode(3);
    /// assert_eq!(err.as_label(), "invalid_mode");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ControllerError::InvalidStateTransition { .. } => "invalid_state_transition",
            ControllerError::Configuration(_) => "configuration_error",
            ControllerError::InvalidMode(_) => "invalid_mode",
            ControllerError::Directory { .. } => "directory_error",
            ControllerError::Watch(_) => "watch_error",
            ControllerError::InvalidCommand(_) => "invalid_command",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Errors produced by a loop body.
///
/// `Canceled` is the normal way for a loop to end; everything else is logged by
/// the loop supervisor and treated as loop termination.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LoopError {
    /// Non-recoverable error; the loop cannot continue (e.g. watcher closed).
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Loop observed its cancellation token.
    #[error("context cancelled")]
    Canceled,
}

impl LoopError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use dsm_controller::LoopError;
    ///
    /// assert_eq!(LoopError::Canceled.as_label(), "loop_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LoopError::Fatal { .. } => "loop_fatal",
            LoopError::Canceled => "loop_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            LoopError::Fatal { error } => format!("fatal: {error}"),
            LoopError::Canceled => "context cancelled".to_string(),
        }
    }
}

/// # Errors produced while reading a telemetry file.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParseError {
    /// Data row shorter than the fixed column layout.
    #[error("row has {found} fields, expected {expected}")]
    ShortRow {
        /// Number of fields present.
        found: usize,
        /// Number of fields required.
        expected: usize,
    },

    /// Numeric column could not be parsed.
    #[error("field {field}: invalid number {value:?}")]
    Number {
        /// Column name.
        field: &'static str,
        /// Raw value.
        value: String,
    },

    /// Timestamp column could not be parsed.
    #[error("invalid timestamp {value:?}: {source}")]
    Timestamp {
        /// Raw value.
        value: String,
        /// Parser failure.
        #[source]
        source: chrono::ParseError,
    },

    /// Configuration file is not valid YAML or misses keys.
    #[error("configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Data file could not be read as CSV.
    #[error("data file: {0}")]
    Csv(#[from] csv::Error),

    /// File could not be opened or read.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
