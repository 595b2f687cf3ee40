//! # LogWriter: renders bus events through `tracing`.
//!
//! ## Example output
//! ```text
//! INFO summary state state=DISABLED
//! INFO settings applied dir=/tmp/dsm_x1Yz loop_time=1
//! INFO configuration camera=Sim_Camera fps=120 buffer=128
//! INFO loop started loop=telemetry
//! WARN loop forced loop=simulation timeout_ms=5000
//! ERROR error code code=1 report="ingestion loop died"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, trace, warn};

use crate::events::{Event, EventKind, Payload};
use crate::subscribers::Subscribe;

/// Logs every event it receives.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let source = e.source.as_deref().unwrap_or("unknown");
        let reason = e.reason.as_deref().unwrap_or("");

        match (e.kind, &e.payload) {
            (EventKind::SummaryState, Some(Payload::State(state))) => {
                info!(seq = e.seq, state = %state, "summary state");
            }
            (EventKind::SettingsApplied, Some(Payload::SettingsApplied(applied))) => {
                info!(
                    dir = ?applied.telemetry_directory,
                    loop_time = applied.simulation_loop_time,
                    "settings applied"
                );
            }
            (EventKind::Configuration, Some(Payload::Configuration(rec))) => {
                info!(
                    camera = %rec.camera_name,
                    fps = rec.camera_fps,
                    buffer = rec.data_buffer_size,
                    "configuration"
                );
            }
            (EventKind::DomeSeeing, Some(Payload::DomeSeeing(rec))) => {
                debug!(
                    index = rec.dsm_index,
                    rms_x = rec.rms_x,
                    rms_y = rec.rms_y,
                    fwhm = rec.fwhm,
                    "dome seeing"
                );
            }
            (EventKind::Heartbeat, _) => trace!(seq = e.seq, "heartbeat"),
            (EventKind::ErrorCode, _) => {
                error!(code = ?e.code, report = reason, "error code");
            }
            (EventKind::LoopStarted, _) => info!(loop_name = source, "loop started"),
            (EventKind::LoopStopped, _) => info!(loop_name = source, "loop stopped"),
            (EventKind::LoopFailed, _) => error!(loop_name = source, reason, "loop failed"),
            (EventKind::LoopForced, _) => {
                warn!(loop_name = source, timeout_ms = ?e.timeout_ms, "loop forced")
            }
            (EventKind::SubscriberOverflow, _) => {
                warn!(subscriber = source, reason, "subscriber overflow")
            }
            (EventKind::SubscriberPanicked, _) => {
                error!(subscriber = source, info = reason, "subscriber panicked")
            }
            (kind, _) => debug!(?kind, seq = e.seq, "event without payload"),
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
