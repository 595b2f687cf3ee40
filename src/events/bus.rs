//! # Broadcast bus for records and runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking publishing from multiple sources (controller, loops, supervisors).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                     Receivers (many):
//!   Controller      ──┐               ┌──► transport / tests
//!   Ingestion loop  ──┼──► Bus ───────┤
//!   LoopSupervisor  ──┘ (broadcast)   └──► subscriber listener ──► SubscriberSet
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks and never fails.
//! - **Bounded capacity**: one ring buffer holds the most recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events published with no receiver attached are lost.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for records and runtime events.
///
/// Cheap to clone (internally an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers; dropped if there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of attached receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::State;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_publish_reaches_every_receiver() {
        let bus = Bus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        bus.publish(Event::summary_state(State::Enabled));

        assert_eq!(a.recv().await.unwrap().state(), Some(State::Enabled));
        assert_eq!(b.recv().await.unwrap().kind, EventKind::SummaryState);
    }

    #[tokio::test]
    async fn test_publish_without_receivers_is_dropped() {
        let bus = Bus::new(0);
        bus.publish(Event::heartbeat());
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }
}
