//! # Synthetic telemetry generator.
//!
//! Writes the same files the instrument UI would: one YAML configuration file
//! and timestamped single-row CSV data files. Values are random but fall inside
//! plausible ranges.
//!
//! The camera profile depends on the simulation tick period:
//! ```text
//! period <= 1s  → fast camera: 120 fps, 128 samples buffer, 1s acquisition
//! period  > 1s  → slow camera:  40 fps, 1024 samples buffer, 25s acquisition
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use rand::Rng;

use super::parser::{Camera, DataSection, UiConfigFile, UiVersions};

/// Name of the simulated UI configuration file.
pub const CONFIG_FILE_NAME: &str = "dsm_ui_config.yaml";

const UI_VERSION_CODE: &str = "1.0.1";
const UI_VERSION_CONFIG: &str = "1.4.4";
const UI_CONFIG_FILE: &str = "/dsm/ui_dsm_config/default.yaml";
const CAMERA_NAME: &str = "Sim_Camera";

/// Camera parameters written into the configuration file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraProfile {
    pub fps: u32,
    pub buffer_size: u32,
    /// Seconds covered by one data row.
    pub acquisition_time: f64,
}

impl CameraProfile {
    pub const FAST: CameraProfile = CameraProfile {
        fps: 120,
        buffer_size: 128,
        acquisition_time: 1.0,
    };

    pub const SLOW: CameraProfile = CameraProfile {
        fps: 40,
        buffer_size: 1024,
        acquisition_time: 25.0,
    };

    /// Selects the profile matching a simulation tick period.
    pub fn for_period(period: Duration) -> Self {
        if period > Duration::from_secs(1) {
            Self::SLOW
        } else {
            Self::FAST
        }
    }
}

fn iso(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Writes the UI configuration file into `dir` and returns its path.
pub fn create_telemetry_config(dir: &Path, profile: CameraProfile) -> std::io::Result<PathBuf> {
    let content = UiConfigFile {
        timestamp: iso(Utc::now().naive_utc()),
        ui_versions: UiVersions {
            code: UI_VERSION_CODE.to_string(),
            config: UI_VERSION_CONFIG.to_string(),
            config_file: UI_CONFIG_FILE.to_string(),
        },
        camera: Camera {
            name: CAMERA_NAME.to_string(),
            fps: profile.fps,
        },
        data: DataSection {
            buffer_size: profile.buffer_size,
            acquisition_time: profile.acquisition_time,
        },
    };

    let path = dir.join(CONFIG_FILE_NAME);
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_yaml::to_writer(&mut writer, &content).map_err(std::io::Error::other)?;
    writer.flush()?;
    Ok(path)
}

/// Writes one data file with a freshly randomized row and returns its path.
pub fn create_telemetry_data(dir: &Path, profile: CameraProfile) -> std::io::Result<PathBuf> {
    let mut rng = rand::rng();
    let now = Utc::now().naive_utc();
    let span = chrono::Duration::milliseconds((profile.acquisition_time * 1000.0) as i64);
    let first = now - span;

    // Same RMS for both axes, kept strictly positive.
    let rms = 1.0 - rng.random::<f64>();
    let row = [
        iso(now),
        iso(first),
        iso(now),
        rms.to_string(),
        rms.to_string(),
        (215.0 + rng.random::<f64>() * 10.0).to_string(),
        (320.0 + rng.random::<f64>() * 10.0).to_string(),
        (2000.0 + rng.random::<f64>() * 500.0).to_string(),
        (1000.0 + rng.random::<f64>() * 200.0).to_string(),
        (6.0 + rng.random::<f64>() * 2.0).to_string(),
    ];

    let path = dir.join(format!("dsm_{}.dat", now.format("%Y%m%d_%H%M%S_%3f")));
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&path)
        .map_err(std::io::Error::other)?;
    writer.write_record(&row).map_err(std::io::Error::other)?;
    writer.flush()?;
    Ok(path)
}
