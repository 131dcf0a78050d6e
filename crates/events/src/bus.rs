//! Event bus implementation using tokio broadcast channels
//!
//! Publishing never blocks: slow subscribers lag and lose old events rather than
//! holding back node tasks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::types::{Event, EventEnvelope};

/// Capacity for the broadcast channel
const DEFAULT_CAPACITY: usize = 1024;

/// Event bus for publishing and subscribing to events.
///
/// Every envelope going through [`EventBus::emit`] gets the next sequence number,
/// so consumers can restore emission order across concurrently running node tasks.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wrap, sequence and publish an event. Returns the envelope that was sent.
    pub fn emit(&self, event: Event) -> EventEnvelope {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = EventEnvelope::new(event).with_sequence(seq);
        self.publish(envelope.clone());
        envelope
    }

    /// Publish an already built envelope to all subscribers
    ///
    /// Returns the number of subscribers that received the event; 0 when nobody
    /// listens (the event is dropped).
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Last sequence number handed out
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .field("sequence", &self.current_sequence())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> Event {
        Event::DeployStarted {
            lab: "test".to_string(),
            nodes: 1,
        }
    }

    #[tokio::test]
    async fn test_emit_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let sent = bus.emit(started());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, sent.id);
        assert_eq!(received.sequence, 1);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let delivered = bus.publish(EventEnvelope::new(started()));
        assert_eq!(delivered, 2);

        let received1 = rx1.recv().await.unwrap();
        let received2 = rx2.recv().await.unwrap();
        assert_eq!(received1.id, received2.id);
    }

    #[tokio::test]
    async fn test_no_subscribers() {
        let bus = EventBus::new();

        let delivered = bus.publish(EventEnvelope::new(started()));
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_sequence_is_shared_between_clones() {
        let bus1 = EventBus::new();
        let bus2 = bus1.clone();
        let mut rx = bus1.subscribe();

        bus1.emit(started());
        bus2.emit(started());

        assert_eq!(rx.recv().await.unwrap().sequence, 1);
        assert_eq!(rx.recv().await.unwrap().sequence, 2);
        assert_eq!(bus1.current_sequence(), 2);
        assert_eq!(bus2.current_sequence(), 2);
    }

    #[test]
    fn test_subscriber_count() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);

        let _rx1 = bus.subscribe();
        let _rx2 = bus.clone().subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }
}
