//! # Telemetry record model.
//!
//! Plain data published onto the bus: a [`ConfigurationRecord`] per UI
//! configuration file and a [`DomeSeeingRecord`] per data row. Data rows are
//! headerless CSV with a fixed column order:
//!
//! ```text
//! timestampCurrent, timestampFirst, timestampLast, rmsX, rmsY,
//! centroidX, centroidY, flux, maxADC, fwhm
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::ParseError;

/// TAI - UTC offset in seconds (valid since 2017-01-01).
pub const TAI_OFFSET_SECONDS: f64 = 37.0;

/// Number of columns in a data row.
pub const DATA_COLUMNS: usize = 10;

/// Converts an ISO-8601 timestamp (UTC, no zone) into TAI unix seconds.
///
/// A trailing `Z` is accepted; fractional seconds are optional.
///
/// # Example
/// ```
/// let tai = dsm_controller::telemetry::convert_time("2019-08-08T22:26:52.451723").unwrap();
/// assert!((tai - 1565303249.451723).abs() < 1e-6);
/// ```
pub fn convert_time(value: &str) -> Result<f64, ParseError> {
    let trimmed = value.trim();
    let naive: NaiveDateTime = trimmed
        .strip_suffix('Z')
        .unwrap_or(trimmed)
        .parse()
        .map_err(|source| ParseError::Timestamp {
            value: value.to_string(),
            source,
        })?;
    let micros = naive.and_utc().timestamp_micros();
    Ok(micros as f64 / 1e6 + TAI_OFFSET_SECONDS)
}

/// Recognized telemetry file kinds. Anything else in the directory is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// UI configuration (`.yaml` / `.yml`).
    Configuration,
    /// Measurement rows (`.dat`).
    Data,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yaml" | "yml" => Some(FileKind::Configuration),
            "dat" => Some(FileKind::Data),
            _ => None,
        }
    }
}

/// Published once per matching configuration file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationRecord {
    pub dsm_index: u32,
    /// TAI seconds of the configuration `timestamp` key.
    pub timestamp_config_start: f64,
    pub ui_version_code: String,
    pub ui_version_config: String,
    /// UI configuration file as a URI.
    pub ui_config_file: String,
    pub camera_name: String,
    pub camera_fps: u32,
    pub data_buffer_size: u32,
    pub data_acquisition_time: f64,
}

/// Published once per parsed data row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomeSeeingRecord {
    pub dsm_index: u32,
    pub timestamp_current: f64,
    pub timestamp_first_measurement: f64,
    pub timestamp_last_measurement: f64,
    pub rms_x: f64,
    pub rms_y: f64,
    pub centroid_x: f64,
    pub centroid_y: f64,
    pub flux: f64,
    pub max_adc: f64,
    pub fwhm: f64,
}

impl DomeSeeingRecord {
    /// Maps one CSV row onto a record.
    ///
    /// Rows shorter than [`DATA_COLUMNS`] are rejected; extra trailing fields are ignored.
    pub fn from_row<S: AsRef<str>>(dsm_index: u32, row: &[S]) -> Result<Self, ParseError> {
        if row.len() < DATA_COLUMNS {
            return Err(ParseError::ShortRow {
                found: row.len(),
                expected: DATA_COLUMNS,
            });
        }
        let field = |i: usize| row[i].as_ref();

        Ok(Self {
            dsm_index,
            timestamp_current: convert_time(field(0))?,
            timestamp_first_measurement: convert_time(field(1))?,
            timestamp_last_measurement: convert_time(field(2))?,
            rms_x: number("rmsX", field(3))?,
            rms_y: number("rmsY", field(4))?,
            centroid_x: number("centroidX", field(5))?,
            centroid_y: number("centroidY", field(6))?,
            flux: number("flux", field(7))?,
            max_adc: number("maxADC", field(8))?,
            fwhm: number("fwhm", field(9))?,
        })
    }
}

fn number(field: &'static str, value: &str) -> Result<f64, ParseError> {
    value.trim().parse().map_err(|_| ParseError::Number {
        field,
        value: value.to_string(),
    })
}

/// Converts a configuration file reference into a URI.
///
/// Absolute paths get a `file://` scheme; values that already carry a scheme are kept.
pub fn to_file_uri(value: &str) -> String {
    if value.contains("://") {
        value.to_string()
    } else if value.starts_with('/') {
        format!("file://{value}")
    } else {
        value.to_string()
    }
}

/// Published once per `start`: where telemetry is read from and how fast it is simulated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsApplied {
    pub telemetry_directory: Option<PathBuf>,
    /// Simulation tick period in seconds (0 in real mode).
    pub simulation_loop_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROW: [&str; 10] = [
        "2019-08-08T22:26:52.451723",
        "2019-08-08T22:26:27.451723",
        "2019-08-08T22:26:52.451723",
        "0.5",
        "0.5",
        "214.3",
        "320.1",
        "2001.2",
        "1001.4",
        "6.2",
    ];

    #[test]
    fn test_convert_time() {
        let tai = convert_time("2019-08-08T22:26:52.451723").unwrap();
        assert!((tai - 1565303249.451723).abs() < 1e-6, "got {tai}");
    }

    #[test]
    fn test_convert_time_variants() {
        let plain = convert_time("2019-08-08T22:26:52").unwrap();
        let zulu = convert_time("2019-08-08T22:26:52Z").unwrap();
        assert_eq!(plain, zulu);
        assert!((plain - 1565303249.0).abs() < 1e-6);
        assert!(convert_time("yesterday").is_err());
    }

    #[test]
    fn test_record_from_row() {
        let rec = DomeSeeingRecord::from_row(1, &ROW).unwrap();
        assert_eq!(rec.dsm_index, 1);
        assert_eq!(rec.rms_x, 0.5);
        assert_eq!(rec.rms_y, 0.5);
        assert!((rec.centroid_x - 214.3).abs() < 1e-9);
        assert!((rec.centroid_y - 320.1).abs() < 1e-9);
        assert!(rec.timestamp_current >= 0.0);
        assert!(rec.timestamp_first_measurement < rec.timestamp_last_measurement);
        assert!((rec.fwhm - 6.2).abs() < 1e-9);
    }

    #[test]
    fn test_short_row_rejected() {
        let err = DomeSeeingRecord::from_row(1, &ROW[..5]).unwrap_err();
        assert!(matches!(err, ParseError::ShortRow { found: 5, expected: 10 }));
    }

    #[test]
    fn test_bad_number_rejected() {
        let mut row = ROW;
        row[7] = "lots";
        let err = DomeSeeingRecord::from_row(1, &row).unwrap_err();
        assert!(matches!(err, ParseError::Number { field: "flux", .. }));
    }

    #[test]
    fn test_file_kind() {
        assert_eq!(
            FileKind::from_path(Path::new("/t/dsm_ui_config.yaml")),
            Some(FileKind::Configuration)
        );
        assert_eq!(
            FileKind::from_path(Path::new("a.yml")),
            Some(FileKind::Configuration)
        );
        assert_eq!(FileKind::from_path(Path::new("dsm_1.dat")), Some(FileKind::Data));
        assert_eq!(FileKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(FileKind::from_path(Path::new("dat")), None);
    }

    #[test]
    fn test_file_uri() {
        assert_eq!(
            to_file_uri("/dsm/ui_dsm_config/default.yaml"),
            "file:///dsm/ui_dsm_config/default.yaml"
        );
        assert_eq!(to_file_uri("file:///x.yaml"), "file:///x.yaml");
        assert_eq!(to_file_uri("x.yaml"), "x.yaml");
    }
}
