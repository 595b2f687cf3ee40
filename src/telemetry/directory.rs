//! # Telemetry directory manager.
//!
//! Owns the telemetry directory path and its provenance:
//! - **Simulated**: a temporary directory allocated under the temp root, created
//!   once and reused across STANDBY ↔ DISABLED ↔ ENABLED cycles, removed on teardown.
//! - **External**: taken from the environment override or the settings; this
//!   manager never creates nor deletes it.
//!
//! ## Rules
//! - `resolve` has no side effect in real mode.
//! - `cleanup_files` only removes regular files directly inside the directory.
//! - `teardown` is idempotent; a missing path is not an error.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::controller::SimulationMode;
use crate::error::ControllerError;

const TEMP_PREFIX: &str = "dsm_";

/// Where the current directory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Allocated by this manager for a simulation mode.
    Simulated,
    /// Provided by configuration or environment.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Assigned {
    path: PathBuf,
    provenance: Provenance,
}

/// Allocates, resolves and cleans the telemetry directory.
#[derive(Debug)]
pub struct DirectoryManager {
    temp_root: PathBuf,
    assigned: Option<Assigned>,
}

impl DirectoryManager {
    pub fn new(temp_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
            assigned: None,
        }
    }

    /// Currently assigned directory, if any.
    pub fn current(&self) -> Option<&Path> {
        self.assigned.as_ref().map(|a| a.path.as_path())
    }

    pub fn provenance(&self) -> Option<Provenance> {
        self.assigned.as_ref().map(|a| a.provenance)
    }

    /// True if the current directory was allocated for simulation.
    pub fn is_simulated(&self) -> bool {
        self.provenance() == Some(Provenance::Simulated)
    }

    /// Resolves the directory for `mode`.
    ///
    /// Real mode uses `external` (environment override or settings) and fails if
    /// none is configured. Simulation modes reuse the assigned temporary directory
    /// when it still exists under the temp root; otherwise a new one is created.
    pub fn resolve(
        &mut self,
        mode: SimulationMode,
        external: Option<&Path>,
    ) -> Result<PathBuf, ControllerError> {
        if !mode.is_simulated() {
            let path = external.ok_or_else(|| {
                ControllerError::Configuration(
                    "no telemetry directory configured for real mode".to_string(),
                )
            })?;
            self.assigned = Some(Assigned {
                path: path.to_path_buf(),
                provenance: Provenance::External,
            });
            return Ok(path.to_path_buf());
        }

        if let Some(existing) = &self.assigned {
            if existing.provenance == Provenance::Simulated
                && existing.path.starts_with(&self.temp_root)
                && existing.path.is_dir()
            {
                debug!(dir = %existing.path.display(), "reusing simulation telemetry directory");
                return Ok(existing.path.clone());
            }
        }

        let path = self.allocate()?;
        info!(dir = %path.display(), "created temporary telemetry directory");
        self.assigned = Some(Assigned {
            path: path.clone(),
            provenance: Provenance::Simulated,
        });
        Ok(path)
    }

    fn allocate(&self) -> Result<PathBuf, ControllerError> {
        let wrap = |source| ControllerError::Directory {
            path: self.temp_root.clone(),
            source,
        };
        std::fs::create_dir_all(&self.temp_root).map_err(wrap)?;
        let dir = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir_in(&self.temp_root)
            .map_err(wrap)?;
        Ok(dir.keep())
    }

    /// Forgets the current directory, removing it first if it was simulated.
    pub fn release(&mut self) -> Result<(), ControllerError> {
        if let Some(assigned) = self.assigned.take() {
            if assigned.provenance == Provenance::Simulated {
                Self::teardown(&assigned.path).map_err(|source| ControllerError::Directory {
                    path: assigned.path.clone(),
                    source,
                })?;
                info!(dir = %assigned.path.display(), "removed telemetry directory");
            }
        }
        Ok(())
    }

    /// Deletes every regular file directly inside `path`; returns how many were removed.
    pub fn cleanup_files(path: &Path) -> io::Result<usize> {
        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(removed)
    }

    /// Recursively removes `path`. Missing paths are ignored.
    pub fn teardown(path: &Path) -> io::Result<()> {
        match std::fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
