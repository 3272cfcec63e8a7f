//! Order lifecycle events
//!
//! Published on a broadcast channel so any number of subscribers (API
//! handlers, logging, tests) observe order book and coordinator changes.

use crate::coordination::OperationKind;
use crate::orders::OrderId;
use crate::source::SnapshotOrigin;

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Capacity of the event channel; slow subscribers lag rather than block
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Events emitted by the order source and the coordinators
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    /// A fetch result was committed as the visible order book
    OrderBookUpdated {
        committee: u64,
        sequence: u64,
        origin: SnapshotOrigin,
        order_count: usize,
    },

    /// A fetch resolved after a newer one was dispatched
    StaleFetchDiscarded { committee: u64, sequence: u64, latest: u64 },

    /// Phase one signal transaction accepted by the counter-asset network
    LockSubmitted {
        operation_id: Uuid,
        order_id: OrderId,
        tx_hash: String,
    },

    /// Phase two payment accepted by the counter-asset network
    CloseSubmitted {
        operation_id: Uuid,
        order_id: OrderId,
        tx_hash: String,
    },

    /// Seller withdrew an order on the native chain
    OrderCancelled {
        operation_id: Uuid,
        order_id: OrderId,
        tx_hash: String,
    },

    /// A coordinator attempt ended without a transaction
    OperationFailed {
        operation_id: Uuid,
        kind: OperationKind,
        order_id: OrderId,
        reason: String,
    },
}

impl OrderEvent {
    /// Get event name for metrics and logs
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::OrderBookUpdated { .. } => "order_book_updated",
            OrderEvent::StaleFetchDiscarded { .. } => "stale_fetch_discarded",
            OrderEvent::LockSubmitted { .. } => "lock_submitted",
            OrderEvent::CloseSubmitted { .. } => "close_submitted",
            OrderEvent::OrderCancelled { .. } => "order_cancelled",
            OrderEvent::OperationFailed { .. } => "operation_failed",
        }
    }

    /// Order the event is about, if any
    pub fn order_id(&self) -> Option<&OrderId> {
        match self {
            OrderEvent::LockSubmitted { order_id, .. }
            | OrderEvent::CloseSubmitted { order_id, .. }
            | OrderEvent::OrderCancelled { order_id, .. }
            | OrderEvent::OperationFailed { order_id, .. } => Some(order_id),
            _ => None,
        }
    }
}

/// Sending half shared by everything that publishes events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OrderEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; having no subscribers is not an error
    pub fn publish(&self, event: OrderEvent) {
        crate::metrics::record_event(&event);
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_receives_event() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(OrderEvent::StaleFetchDiscarded {
            committee: 1,
            sequence: 1,
            latest: 2,
        });

        assert_eq!(first.recv().await.unwrap().name(), "stale_fetch_discarded");
        assert_eq!(second.recv().await.unwrap().name(), "stale_fetch_discarded");
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        EventBus::new().publish(OrderEvent::OrderBookUpdated {
            committee: 1,
            sequence: 1,
            origin: SnapshotOrigin::Live,
            order_count: 0,
        });
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = OrderEvent::LockSubmitted {
            operation_id: Uuid::nil(),
            order_id: OrderId::new("o1"),
            tx_hash: "0xabc".to_string(),
        };
        assert_eq!(event.order_id(), Some(&OrderId::new("o1")));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "lock_submitted");
        assert_eq!(json["order_id"], "o1");
    }
}
