//! # Telemetry file parsers.
//!
//! - [`parse_configuration`]: YAML UI configuration → [`ConfigurationRecord`]
//! - [`parse_data`]: headerless CSV → one `Result` per row
//!
//! A malformed row only affects itself; the caller logs it and moves on.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::record::{convert_time, to_file_uri, ConfigurationRecord, DomeSeeingRecord};
use crate::error::ParseError;

/// On-disk layout of the UI configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct UiConfigFile {
    pub timestamp: String,
    pub ui_versions: UiVersions,
    pub camera: Camera,
    pub data: DataSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct UiVersions {
    pub code: String,
    pub config: String,
    pub config_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Camera {
    pub name: String,
    pub fps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DataSection {
    pub buffer_size: u32,
    pub acquisition_time: f64,
}

/// Parses a UI configuration file.
pub fn parse_configuration(path: &Path, dsm_index: u32) -> Result<ConfigurationRecord, ParseError> {
    let file = File::open(path)?;
    configuration_from_reader(file, dsm_index)
}

pub(crate) fn configuration_from_reader<R: Read>(
    reader: R,
    dsm_index: u32,
) -> Result<ConfigurationRecord, ParseError> {
    let content: UiConfigFile = serde_yaml::from_reader(reader)?;
    Ok(ConfigurationRecord {
        dsm_index,
        timestamp_config_start: convert_time(&content.timestamp)?,
        ui_version_code: content.ui_versions.code,
        ui_version_config: content.ui_versions.config,
        ui_config_file: to_file_uri(&content.ui_versions.config_file),
        camera_name: content.camera.name,
        camera_fps: content.camera.fps,
        data_buffer_size: content.data.buffer_size,
        data_acquisition_time: content.data.acquisition_time,
    })
}

/// Parses a data file into one result per row.
///
/// Opening the file is the only failure that aborts the whole file.
pub fn parse_data(
    path: &Path,
    dsm_index: u32,
) -> Result<Vec<Result<DomeSeeingRecord, ParseError>>, ParseError> {
    let file = File::open(path)?;
    Ok(data_from_reader(file, dsm_index))
}

pub(crate) fn data_from_reader<R: Read>(
    reader: R,
    dsm_index: u32,
) -> Vec<Result<DomeSeeingRecord, ParseError>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
        .records()
        .map(|row| {
            let row = row?;
            let fields: Vec<&str> = row.iter().collect();
            DomeSeeingRecord::from_row(dsm_index, &fields)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "\
timestamp: '2019-08-08T22:26:52.451723'
ui_versions:
  code: 1.0.1
  config: 1.4.4
  config_file: /dsm/ui_dsm_config/default.yaml
camera:
  name: Sim_Camera
  fps: 120
data:
  buffer_size: 128
  acquisition_time: 1
";

    #[test]
    fn test_configuration_from_yaml() {
        let rec = configuration_from_reader(CONFIG.as_bytes(), 2).unwrap();
        assert_eq!(rec.dsm_index, 2);
        assert_eq!(rec.ui_version_code, "1.0.1");
        assert_eq!(rec.ui_version_config, "1.4.4");
        assert_eq!(rec.ui_config_file, "file:///dsm/ui_dsm_config/default.yaml");
        assert_eq!(rec.camera_name, "Sim_Camera");
        assert_eq!(rec.camera_fps, 120);
        assert_eq!(rec.data_buffer_size, 128);
        assert_eq!(rec.data_acquisition_time, 1.0);
        assert!(rec.timestamp_config_start > 0.0);
    }

    #[test]
    fn test_configuration_missing_key() {
        let broken = CONFIG.replace("camera:", "kamera:");
        assert!(matches!(
            configuration_from_reader(broken.as_bytes(), 1),
            Err(ParseError::Yaml(_))
        ));
    }

    #[test]
    fn test_data_rows_skip_short_rows() {
        let data = "\
2019-08-08T22:26:52.451723,2019-08-08T22:26:27.451723,2019-08-08T22:26:52.451723,0.5,0.5,214.3,320.1,2001.2,1001.4,6.2
2019-08-08T22:26:53.0,0.3,0.3
2019-08-08T22:26:54.0,2019-08-08T22:26:29.0,2019-08-08T22:26:54.0,0.7,0.7,215.0,321.0,2002.0,1002.0,6.3
";
        let rows = data_from_reader(data.as_bytes(), 1);
        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_ok());
        assert!(matches!(rows[1], Err(ParseError::ShortRow { found: 3, .. })));
        assert_eq!(rows[2].as_ref().unwrap().rms_x, 0.7);
    }

    #[test]
    fn test_parse_data_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            parse_data(&dir.path().join("missing.dat"), 1),
            Err(ParseError::Io(_))
        ));
    }
}
