//! # Records and runtime events published by the controller.
//!
//! The [`EventKind`] enum classifies events across three categories:
//! - **Bus records**: what the instrument publishes (summary state, settings
//!   applied, configuration, dome seeing, heartbeat, error code)
//! - **Loop events**: background loop lifecycle (started, stopped, failed, forced)
//! - **Subscriber events**: fan-out health (overflow, panic)
//!
//! The [`Event`] struct carries the kind plus optional metadata; records travel
//! in [`Payload`].
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use dsm_controller::{Event, EventKind, State};
//!
//! let ev = Event::summary_state(State::Disabled);
//! assert_eq!(ev.kind, EventKind::SummaryState);
//! assert_eq!(ev.state(), Some(State::Disabled));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::controller::State;
use crate::telemetry::{ConfigurationRecord, DomeSeeingRecord, SettingsApplied};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of published events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Bus records ===
    /// Controller entered a new summary state.
    ///
    /// Sets:
    /// - `payload`: [`Payload::State`]
    SummaryState,

    /// `start` resolved its settings.
    ///
    /// Sets:
    /// - `payload`: [`Payload::SettingsApplied`]
    SettingsApplied,

    /// A UI configuration file was ingested.
    ///
    /// Sets:
    /// - `payload`: [`Payload::Configuration`]
    Configuration,

    /// A data row was ingested.
    ///
    /// Sets:
    /// - `payload`: [`Payload::DomeSeeing`]
    DomeSeeing,

    /// Periodic liveness signal.
    Heartbeat,

    /// Controller went to FAULT.
    ///
    /// Sets:
    /// - `code`: error code
    /// - `reason`: report
    ErrorCode,

    // === Loop events ===
    /// A loop was spawned.
    ///
    /// Sets:
    /// - `source`: loop name
    LoopStarted,

    /// A loop finished or was cancelled cooperatively.
    ///
    /// Sets:
    /// - `source`: loop name
    LoopStopped,

    /// A loop body returned an error other than cancellation, or panicked.
    ///
    /// Sets:
    /// - `source`: loop name
    /// - `reason`: failure message
    LoopFailed,

    /// A loop ignored cancellation for longer than the die timeout and was aborted.
    ///
    /// Sets:
    /// - `source`: loop name
    /// - `timeout_ms`: timeout that elapsed
    LoopForced,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,
}

/// Record carried by bus events.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    State(State),
    SettingsApplied(SettingsApplied),
    Configuration(ConfigurationRecord),
    DomeSeeing(DomeSeeingRecord),
}

/// Published event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Record, for bus records.
    pub payload: Option<Payload>,
    /// Loop or subscriber name, if applicable.
    pub source: Option<Arc<str>>,
    /// Human-readable reason (errors, fault report, overflow details).
    pub reason: Option<Arc<str>>,
    /// Error code (for `ErrorCode`).
    pub code: Option<i32>,
    /// Timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            payload: None,
            source: None,
            reason: None,
            code: None,
            timeout_ms: None,
        }
    }

    #[inline]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attaches a loop or subscriber name.
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    pub fn summary_state(state: State) -> Self {
        Event::new(EventKind::SummaryState).with_payload(Payload::State(state))
    }

    pub fn settings_applied(applied: SettingsApplied) -> Self {
        Event::new(EventKind::SettingsApplied).with_payload(Payload::SettingsApplied(applied))
    }

    pub fn configuration(record: ConfigurationRecord) -> Self {
        Event::new(EventKind::Configuration).with_payload(Payload::Configuration(record))
    }

    pub fn dome_seeing(record: DomeSeeingRecord) -> Self {
        Event::new(EventKind::DomeSeeing).with_payload(Payload::DomeSeeing(record))
    }

    pub fn heartbeat() -> Self {
        Event::new(EventKind::Heartbeat)
    }

    pub fn error_code(code: i32, report: impl Into<Arc<str>>) -> Self {
        Event::new(EventKind::ErrorCode)
            .with_code(code)
            .with_reason(report)
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_source(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_source(subscriber)
            .with_reason(info)
    }

    /// Summary state carried by a `SummaryState` event.
    pub fn state(&self) -> Option<State> {
        match &self.payload {
            Some(Payload::State(s)) => Some(*s),
            _ => None,
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SummaryState
                | EventKind::SettingsApplied
                | EventKind::Configuration
                | EventKind::DomeSeeing
                | EventKind::Heartbeat
                | EventKind::ErrorCode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::heartbeat();
        let b = Event::heartbeat();
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_error_code_event() {
        let ev = Event::error_code(7, "ingest loop died");
        assert_eq!(ev.kind, EventKind::ErrorCode);
        assert_eq!(ev.code, Some(7));
        assert_eq!(ev.reason.as_deref(), Some("ingest loop died"));
        assert!(ev.is_record());
        assert!(ev.state().is_none());
    }

    #[test]
    fn test_timeout_is_clamped() {
        let ev = Event::new(EventKind::LoopForced).with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(ev.timeout_ms, Some(u32::MAX));
        assert!(!ev.is_record());
    }
}
