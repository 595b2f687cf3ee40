//! Commands accepted by the controller and their acknowledgements.

use std::fmt;
use std::str::FromStr;

use tokio::sync::oneshot;

use crate::error::ControllerError;

/// One command, as received from the command bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// STANDBY → DISABLED using the settings selected by `settings`.
    Start { settings: String },
    /// DISABLED → ENABLED.
    Enable,
    /// ENABLED → DISABLED.
    Disable,
    /// DISABLED | FAULT → STANDBY.
    Standby,
    /// STANDBY → OFFLINE.
    ExitControl,
    /// Changes the simulation mode; STANDBY only.
    SetSimulationMode { mode: i64 },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Enable => "enable",
            Command::Disable => "disable",
            Command::Standby => "standby",
            Command::ExitControl => "exitControl",
            Command::SetSimulationMode { .. } => "setSimulationMode",
        }
    }

    pub fn start(settings: impl Into<String>) -> Self {
        Command::Start {
            settings: settings.into(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Start { settings } => write!(f, "start({settings:?})"),
            Command::SetSimulationMode { mode } => write!(f, "setSimulationMode({mode})"),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for Command {
    type Err = ControllerError;

    /// Parses `name [arg]`, e.g. `start simulation` or `setSimulationMode 1`.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();
        if parts.next().is_some() {
            return Err(ControllerError::InvalidCommand(format!("too many arguments: {line:?}")));
        }

        match (name, arg) {
            ("start", label) => Ok(Command::start(label.unwrap_or_default())),
            ("enable", None) => Ok(Command::Enable),
            ("disable", None) => Ok(Command::Disable),
            ("standby", None) => Ok(Command::Standby),
            ("exitControl", None) => Ok(Command::ExitControl),
            ("setSimulationMode", Some(mode)) => mode
                .parse()
                .map(|mode| Command::SetSimulationMode { mode })
                .map_err(|_| ControllerError::InvalidCommand(format!("mode must be an integer, got {mode:?}"))),
            _ => Err(ControllerError::InvalidCommand(line.to_string())),
        }
    }
}

/// Command acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Complete,
    /// `code` is a stable snake_case label, `message` is for humans.
    Failed { code: &'static str, message: String },
}

impl Ack {
    pub fn is_complete(&self) -> bool {
        matches!(self, Ack::Complete)
    }

    /// Failure label, if any.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Ack::Complete => None,
            Ack::Failed { code, .. } => Some(code),
        }
    }

    pub(crate) fn failed(code: &'static str, message: impl Into<String>) -> Self {
        Ack::Failed {
            code,
            message: message.into(),
        }
    }
}

impl From<Result<(), ControllerError>> for Ack {
    fn from(res: Result<(), ControllerError>) -> Self {
        match res {
            Ok(()) => Ack::Complete,
            Err(e) => Ack::failed(e.as_label(), e.as_message()),
        }
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ack::Complete => f.write_str("complete"),
            Ack::Failed { code, message } => write!(f, "failed [{code}]: {message}"),
        }
    }
}

/// A command paired with the channel its ack goes back on.
#[derive(Debug)]
pub(crate) struct Request {
    pub command: Command,
    pub reply: oneshot::Sender<Ack>,
}
