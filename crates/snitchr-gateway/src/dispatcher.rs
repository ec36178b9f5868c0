use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;
use tracing::debug;

use snitchr_types::events::ChangeEvent;

/// Default broadcast buffer. A subscriber that falls further behind than
/// this loses events and is told to resync.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Fans committed changes out to every connected feed subscriber.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for change events. Every subscriber receives every event.
    broadcast_tx: broadcast::Sender<ChangeEvent>,

    /// Number of open WebSocket connections
    connections: AtomicUsize,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: AtomicUsize::new(0),
            }),
        }
    }

    /// Subscribe to change events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish a change to all current subscribers. Having no subscribers
    /// is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        debug!("Publishing {} for confession {}", event.kind(), event.id());
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Track a new connection. Returns the count including it.
    pub fn connection_opened(&self) -> usize {
        self.inner.connections.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn connection_closed(&self) {
        self.inner.connections.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn connections(&self) -> usize {
        self.inner.connections.load(Ordering::Acquire)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tokio::sync::broadcast::error::RecvError;

    use super::*;
    use snitchr_types::models::{Confession, Reactions};

    fn record(id: &str) -> Confession {
        Confession {
            id: id.into(),
            message: "hello".into(),
            nickname: None,
            mood: None,
            location: None,
            created_at: Utc::now(),
            reactions: Reactions::default(),
        }
    }

    #[tokio::test]
    async fn every_subscriber_sees_published_events() {
        let dispatcher = Dispatcher::new();
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();

        dispatcher.publish(ChangeEvent::Insert(record("1")));

        assert_eq!(a.recv().await.unwrap().id(), "1");
        assert_eq!(b.recv().await.unwrap().id(), "1");
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let dispatcher = Dispatcher::new();
        dispatcher.publish(ChangeEvent::Delete(record("1")));
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag() {
        let dispatcher = Dispatcher::with_capacity(2);
        let mut rx = dispatcher.subscribe();

        for i in 0..5 {
            dispatcher.publish(ChangeEvent::Update(record(&i.to_string())));
        }

        match rx.recv().await {
            Err(RecvError::Lagged(n)) => assert_eq!(n, 3),
            other => panic!("expected lag, got {:?}", other),
        }
        assert_eq!(rx.recv().await.unwrap().id(), "3");
    }

    #[test]
    fn connection_counting() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.connection_opened(), 1);
        assert_eq!(dispatcher.connection_opened(), 2);
        dispatcher.connection_closed();
        assert_eq!(dispatcher.connections(), 1);
    }
}
