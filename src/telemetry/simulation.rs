//! # Simulation loop.
//!
//! Writes synthetic telemetry into the directory on a fixed tick:
//! the configuration file once (until the controller resets the flag), then one
//! data file per tick. File writes run on the blocking pool; cancellation is
//! observed between ticks and is immediate during the sleep.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::generator::{create_telemetry_config, create_telemetry_data, CameraProfile};
use crate::error::LoopError;
use crate::tasks::Task;

/// Loop name used in events and logs.
pub const SIMULATION_LOOP: &str = "simulation";

/// Loop body generating synthetic files.
#[derive(Clone)]
pub struct SimulationLoop {
    dir: PathBuf,
    period: Duration,
    profile: CameraProfile,
    config_written: Arc<AtomicBool>,
}

impl SimulationLoop {
    /// `config_written` is shared with the controller, which clears it on `disable`.
    pub fn new(dir: impl Into<PathBuf>, period: Duration, config_written: Arc<AtomicBool>) -> Self {
        Self {
            dir: dir.into(),
            period,
            profile: CameraProfile::for_period(period),
            config_written,
        }
    }

    /// Writes the files for one tick.
    pub fn tick(&self) {
        if !self.config_written.load(Ordering::Acquire) {
            match create_telemetry_config(&self.dir, self.profile) {
                Ok(path) => {
                    debug!(path = %path.display(), "wrote simulated configuration");
                    self.config_written.store(true, Ordering::Release);
                }
                Err(e) => warn!(dir = %self.dir.display(), error = %e, "failed to write simulated configuration"),
            }
        }

        match create_telemetry_data(&self.dir, self.profile) {
            Ok(path) => debug!(path = %path.display(), "wrote simulated data"),
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "failed to write simulated data"),
        }
    }
}

#[async_trait]
impl Task for SimulationLoop {
    fn name(&self) -> &str {
        SIMULATION_LOOP
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), LoopError> {
        loop {
            if ctx.is_cancelled() {
                return Err(LoopError::Canceled);
            }
            let this = self.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || this.tick()).await {
                warn!(error = %e, "simulation tick aborted");
            }

            tokio::select! {
                _ = ctx.cancelled() => return Err(LoopError::Canceled),
                _ = tokio::time::sleep(self.period) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::generator::CONFIG_FILE_NAME;

    fn count(dir: &std::path::Path, ext: &str) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|x| x == ext))
            .count()
    }

    #[test]
    fn test_config_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let flag = Arc::new(AtomicBool::new(false));
        let sim = SimulationLoop::new(dir.path(), Duration::from_secs(1), flag.clone());

        sim.tick();
        let first = std::fs::metadata(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        sim.tick();

        assert!(flag.load(Ordering::Acquire));
        assert_eq!(count(dir.path(), "yaml"), 1);
        assert!(count(dir.path(), "dat") >= 1);
        let second = std::fs::metadata(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(first.modified().unwrap(), second.modified().unwrap());
    }

    #[tokio::test]
    async fn test_cancel_during_sleep_is_immediate() {
        let dir = tempfile::tempdir().unwrap();
        let sim = Arc::new(SimulationLoop::new(
            dir.path(),
            Duration::from_secs(30),
            Arc::new(AtomicBool::new(false)),
        ));

        let token = CancellationToken::new();
        let handle = tokio::spawn({
            let sim = sim.clone();
            let token = token.clone();
            async move { sim.run(token).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        let res = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(res, Err(LoopError::Canceled)));
        assert_eq!(count(dir.path(), "yaml"), 1);
    }

    #[tokio::test]
    async fn test_missing_directory_does_not_end_loop() {
        let sim = SimulationLoop::new(
            "/nonexistent/dsm/sim",
            Duration::from_millis(10),
            Arc::new(AtomicBool::new(false)),
        );
        let token = CancellationToken::new();
        let res = tokio::time::timeout(Duration::from_millis(50), sim.run(token)).await;
        assert!(res.is_err());
    }
}
