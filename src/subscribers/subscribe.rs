//! # Subscriber trait
//!
//! `Subscribe` is the extension point for consumers of published records:
//! a transport bridge, an archive writer, a test recorder. Each subscriber is driven
//! by a dedicated worker fed by a bounded queue owned by the
//! [`SubscriberSet`](crate::subscribers::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow; they block neither the controller nor other
//!   subscribers.
//! - On queue overflow, events for that subscriber are dropped and a
//!   `SubscriberOverflow` event is published.

use async_trait::async_trait;

use crate::events::Event;

/// Consumer of bus events.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles a single event.
    async fn on_event(&self, event: &Event);

    /// Name used in logs and overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
