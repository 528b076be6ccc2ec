//! In-memory change event broker
//!
//! Capacity-bounded fan-out of change events to any number of subscribers.
//! Publishing never blocks: if no subscriber is connected the event is
//! dropped, and a subscriber that falls behind its buffer loses the oldest
//! events (the cache tolerates that loss; freshness is restored by TTL and
//! subsequent events).

use spyglass_core::{ChangeEvent, ChangeKind};
use tokio::sync::broadcast;
use tracing::trace;

/// Default event buffer per subscriber.
pub const DEFAULT_BROKER_CAPACITY: usize = 256;

/// Broadcast broker for one entity type's change events.
#[derive(Debug)]
pub struct Broker<T: Clone> {
    tx: broadcast::Sender<ChangeEvent<T>>,
}

impl<T: Clone> Broker<T> {
    /// Create a broker with the given per-subscriber event buffer.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a change event to all current subscribers.
    pub fn publish(&self, kind: ChangeKind, payload: T) {
        match self.tx.send(ChangeEvent::new(kind, payload)) {
            Ok(receivers) => {
                trace!(kind = kind.as_str(), receivers, "published change event");
            }
            Err(_) => {
                // No subscribers connected; the event is dropped.
                trace!(kind = kind.as_str(), "no subscribers for change event");
            }
        }
    }

    /// Subscribe to all future change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<T>> {
        self.tx.subscribe()
    }

    /// Number of currently connected subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone> Default for Broker<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BROKER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let broker: Broker<u32> = Broker::new(8);
        let mut rx = broker.subscribe();

        broker.publish(ChangeKind::Created, 7);

        let event = rx.recv().await.expect("event");
        assert_eq!(event.kind, ChangeKind::Created);
        assert_eq!(event.payload, 7);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let broker: Broker<u32> = Broker::new(8);
        broker.publish(ChangeKind::Deleted, 1);
        assert_eq!(broker.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_loses_oldest() {
        let broker: Broker<u32> = Broker::new(2);
        let mut rx = broker.subscribe();

        for n in 0..5 {
            broker.publish(ChangeKind::Created, n);
        }

        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(missed)) => assert!(missed >= 1),
            other => panic!("expected lag, got {other:?}"),
        }
        // After the lag the newest events are still readable.
        let event = rx.recv().await.expect("event after lag");
        assert!(event.payload >= 3);
    }
}
