//! # Runtime configuration and per-`start` settings.
//!
//! Two layers of configuration feed the controller:
//!
//! 1. [`Config`]: process-wide runtime settings (device index, loop shutdown
//!    timeout, heartbeat period, bus capacity, directories). Loaded once at
//!    startup.
//! 2. [`Settings`]: the payload selected by the label passed to the `start`
//!    command. Resolved through a [`SettingsSource`] every time `start` runs.
//!
//! Both are loaded with `figment`, later sources overriding earlier ones:
//! ```text
//! Config:    defaults ─► dsm.toml (optional) ─► DSM_* env
//! Settings:  defaults ─► <settings_dir>/<label>.yaml ─► DSM_SETTINGS_* env
//! ```
//!
//! ## Sentinel values
//! - `heartbeat_interval_ms = 0` → clamped to the minimum interval
//! - `command_timeout_ms = 0` → clamped to the minimum command timeout
//! - `temp_root = None` → OS temporary directory

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Toml, Yaml};
use figment::Figment;
use serde::Deserialize;

use crate::error::ControllerError;

/// Environment variable selecting the real-mode telemetry directory.
pub const TELEMETRY_DIR_ENV: &str = "DSM_TELEMETRY_DIR";

/// Labels that resolve to built-in defaults without a settings file.
pub const BUILTIN_LABELS: [&str; 2] = ["default", "simulation"];

const MIN_HEARTBEAT: Duration = Duration::from_millis(10);
const MIN_COMMAND_TIMEOUT: Duration = Duration::from_millis(100);

/// Global configuration for the controller runtime.
///
/// ## Field semantics
/// - `index`: device index published with every record
/// - `loop_die_timeout_ms`: bounded wait for a loop to stop before it is forced
/// - `heartbeat_interval_ms`: heartbeat / loop health check period
/// - `command_timeout_ms`: maximum time a submitted command may take to ack
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `temp_root`: parent of simulation telemetry directories
/// - `settings_dir`: directory holding `<label>.yaml` settings files
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_index")]
    pub index: u32,

    #[serde(default = "default_loop_die_timeout_ms")]
    pub loop_die_timeout_ms: u64,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    #[serde(default)]
    pub temp_root: Option<PathBuf>,

    #[serde(default)]
    pub settings_dir: Option<PathBuf>,
}

const fn default_index() -> u32 {
    1
}

const fn default_loop_die_timeout_ms() -> u64 {
    5_000
}

const fn default_heartbeat_interval_ms() -> u64 {
    1_000
}

const fn default_command_timeout_ms() -> u64 {
    60_000
}

const fn default_bus_capacity() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index: default_index(),
            loop_die_timeout_ms: default_loop_die_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            bus_capacity: default_bus_capacity(),
            temp_root: None,
            settings_dir: None,
        }
    }
}

impl Config {
    /// Loads configuration from defaults, an optional TOML file and `DSM_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ControllerError> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("DSM_"))
            .extract()
            .map_err(|e| ControllerError::Configuration(e.to_string()))
    }

    /// Bounded wait applied when stopping a loop.
    #[inline]
    pub fn loop_die_timeout(&self) -> Duration {
        Duration::from_millis(self.loop_die_timeout_ms)
    }

    /// Heartbeat period, clamped to a small minimum.
    #[inline]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms).max(MIN_HEARTBEAT)
    }

    #[inline]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms).max(MIN_COMMAND_TIMEOUT)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Parent directory for simulation telemetry directories.
    pub fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Settings applied by the `start` command.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Real-mode telemetry directory (overridden by [`TELEMETRY_DIR_ENV`]).
    pub telemetry_directory: Option<PathBuf>,
    /// Keep simulated data files after they were ingested.
    pub retain_simulated_files: bool,
}

impl Settings {
    fn validate(self) -> Result<Self, ControllerError> {
        if let Some(dir) = &self.telemetry_directory {
            if dir.as_os_str().is_empty() {
                return Err(ControllerError::Configuration(
                    "telemetry_directory must not be empty".to_string(),
                ));
            }
        }
        Ok(self)
    }
}

/// Resolves a settings label into [`Settings`].
pub trait SettingsSource: Send + Sync + 'static {
    /// Loads and validates the settings for `label`.
    fn load(&self, label: &str) -> Result<Settings, ControllerError>;
}

fn normalize_label(label: &str) -> &str {
    match label.trim() {
        "" => BUILTIN_LABELS[0],
        other => other,
    }
}

/// File-backed settings: `<dir>/<label>.yaml` plus `DSM_SETTINGS_*` variables.
#[derive(Clone, Debug, Default)]
pub struct FileSettings {
    dir: Option<PathBuf>,
}

impl FileSettings {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }
}

impl SettingsSource for FileSettings {
    fn load(&self, label: &str) -> Result<Settings, ControllerError> {
        let label = normalize_label(label);
        let file = self
            .dir
            .as_ref()
            .map(|d| d.join(format!("{label}.yaml")))
            .filter(|p| p.is_file());

        let mut figment = Figment::new();
        match file {
            Some(path) => figment = figment.merge(Yaml::file(path)),
            None if BUILTIN_LABELS.contains(&label) => {}
            None => {
                return Err(ControllerError::Configuration(format!(
                    "unknown settings label {label:?}"
                )))
            }
        }

        let settings: Settings = figment
            .merge(Env::prefixed("DSM_SETTINGS_"))
            .extract()
            .map_err(|e| ControllerError::Configuration(e.to_string()))?;
        settings.validate()
    }
}

/// In-memory settings keyed by label.
#[derive(Clone, Debug, Default)]
pub struct StaticSettings {
    labels: HashMap<String, Settings>,
}

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `settings` under `label`.
    pub fn with(mut self, label: impl Into<String>, settings: Settings) -> Self {
        self.labels.insert(label.into(), settings);
        self
    }
}

impl SettingsSource for StaticSettings {
    fn load(&self, label: &str) -> Result<Settings, ControllerError> {
        let label = normalize_label(label);
        match self.labels.get(label) {
            Some(settings) => settings.clone().validate(),
            None if BUILTIN_LABELS.contains(&label) => Ok(Settings::default()),
            None => Err(ControllerError::Configuration(format!(
                "unknown settings label {label:?}"
            ))),
        }
    }
}
