//! # Ingestion loop.
//!
//! Consumes watcher notifications for the telemetry directory and publishes
//! the parsed records.
//!
//! ```text
//! loop {
//!   ├─► await next notification (cancellable)
//!   ├─► in directory? ──► FileKind::from_path (on the blocking pool)
//!   │       ├─ Configuration ─► parse_configuration ─► publish Configuration
//!   │       ├─ Data          ─► parse_data ─► per row: publish DomeSeeing | log & skip
//!   │       │                   └─► simulation directory: remove consumed file
//!   │       └─ unknown       ─► ignore
//!   ├─► watcher error ──► log, keep running
//!   └─► stream closed ──► LoopError::Fatal (loop becomes "done")
//! }
//! ```
//!
//! Each file is processed to completion; cancellation is observed between files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::parser::{parse_configuration, parse_data};
use super::record::FileKind;
use super::watcher::{FileEvent, FileEvents};
use crate::error::LoopError;
use crate::events::{Bus, Event};
use crate::tasks::Task;

/// Loop name used in events and logs.
pub const INGEST_LOOP: &str = "telemetry";

/// Loop body turning closed files into published records.
#[derive(Clone)]
pub struct IngestLoop {
    dir: PathBuf,
    canonical_dir: Option<PathBuf>,
    dsm_index: u32,
    events: FileEvents,
    bus: Bus,
    remove_consumed: bool,
}

impl IngestLoop {
    /// Creates the loop for `dir`.
    ///
    /// With `remove_consumed`, each data file is deleted once processed.
    pub fn new(
        dir: impl Into<PathBuf>,
        dsm_index: u32,
        events: FileEvents,
        bus: Bus,
        remove_consumed: bool,
    ) -> Self {
        let dir = dir.into();
        let canonical_dir = std::fs::canonicalize(&dir).ok().filter(|c| *c != dir);
        Self {
            dir,
            canonical_dir,
            dsm_index,
            events,
            bus,
            remove_consumed,
        }
    }

    /// Handles one notification; returns the number of records published.
    pub fn process_event(&self, ev: &FileEvent) -> usize {
        if !ev.path.parent().is_some_and(|p| self.is_telemetry_dir(p)) {
            debug!(path = %ev.path.display(), "notification outside telemetry directory");
            return 0;
        }

        match FileKind::from_path(&ev.path) {
            Some(FileKind::Configuration) => self.process_configuration(ev),
            Some(FileKind::Data) => self.process_data(ev),
            None => {
                debug!(path = %ev.path.display(), "ignoring unrecognized file");
                0
            }
        }
    }

    /// Backends may report the directory either as given or fully resolved.
    fn is_telemetry_dir(&self, dir: &Path) -> bool {
        dir == self.dir || self.canonical_dir.as_deref() == Some(dir)
    }

    fn process_configuration(&self, ev: &FileEvent) -> usize {
        match parse_configuration(&ev.path, self.dsm_index) {
            Ok(record) => {
                info!(
                    path = %ev.path.display(),
                    camera = %record.camera_name,
                    fps = record.camera_fps,
                    "configuration ingested"
                );
                self.bus.publish(Event::configuration(record));
                1
            }
            Err(e) => {
                warn!(path = %ev.path.display(), error = %e, "skipping configuration file");
                0
            }
        }
    }

    fn process_data(&self, ev: &FileEvent) -> usize {
        let rows = match parse_data(&ev.path, self.dsm_index) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(path = %ev.path.display(), error = %e, "skipping data file");
                return 0;
            }
        };

        let mut published = 0;
        for (line, row) in rows.into_iter().enumerate() {
            match row {
                Ok(record) => {
                    self.bus.publish(Event::dome_seeing(record));
                    published += 1;
                }
                Err(e) => warn!(path = %ev.path.display(), line = line + 1, error = %e, "skipping row"),
            }
        }
        debug!(path = %ev.path.display(), published, "data file ingested");

        if self.remove_consumed {
            if let Err(e) = std::fs::remove_file(&ev.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %ev.path.display(), error = %e, "failed to remove consumed data file");
                }
            }
        }
        published
    }
}

#[async_trait]
impl Task for IngestLoop {
    fn name(&self) -> &str {
        INGEST_LOOP
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), LoopError> {
        let mut stream = tokio::select! {
            _ = ctx.cancelled() => return Err(LoopError::Canceled),
            stream = self.events.lock() => stream,
        };
        info!(dir = %self.dir.display(), "telemetry loop running");

        loop {
            let item = tokio::select! {
                _ = ctx.cancelled() => return Err(LoopError::Canceled),
                item = stream.recv() => item,
            };

            match item {
                Some(Ok(ev)) => {
                    let this = self.clone();
                    let processed = tokio::task::spawn_blocking(move || this.process_event(&ev));
                    if let Err(e) = processed.await {
                        warn!(error = %e, "file processing aborted");
                    }
                }
                Some(Err(e)) => warn!(error = %e, "watcher reported an error"),
                None => {
                    return Err(LoopError::Fatal {
                        error: "watch stream closed".to_string(),
                    })
                }
            }
        }
    }
}
