use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;
use tracing::{debug, error};

use corkboard_types::events::{BoardEvent, Publisher};

/// Default number of events a slow viewer may fall behind before it starts
/// skipping.
const DEFAULT_CAPACITY: usize = 1024;

/// An event plus its JSON encoding. Serialized once in `broadcast` and shared
/// by every connection.
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub event: Arc<BoardEvent>,
    pub json: Arc<str>,
}

/// Fans board events out to every connected viewer.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// All connected viewers receive all events
    broadcast_tx: broadcast::Sender<Broadcast>,

    /// Number of live WebSocket connections
    viewers: AtomicUsize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
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
                viewers: AtomicUsize::new(0),
            }),
        }
    }

    /// Subscribe to board events. Only events broadcast after this call are
    /// delivered; nothing is replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all current subscribers. Never blocks; having no
    /// subscribers is not an error.
    pub fn broadcast(&self, event: BoardEvent) {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize {} event: {}", event.kind(), e);
                return;
            }
        };

        let kind = event.kind();
        let message_id = event.message_id();
        let delivered = self
            .inner
            .broadcast_tx
            .send(Broadcast {
                event: Arc::new(event),
                json: json.into(),
            })
            .unwrap_or(0);

        debug!("{} for message {} queued to {} subscribers", kind, message_id, delivered);
    }

    /// Record a new viewer connection. Returns the new count.
    pub fn viewer_connected(&self) -> usize {
        self.inner.viewers.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a closed viewer connection. Returns the new count.
    pub fn viewer_disconnected(&self) -> usize {
        self.inner.viewers.fetch_sub(1, Ordering::Relaxed).saturating_sub(1)
    }

    pub fn viewer_count(&self) -> usize {
        self.inner.viewers.load(Ordering::Relaxed)
    }
}

impl Publisher for Dispatcher {
    fn publish(&self, event: BoardEvent) {
        self.broadcast(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corkboard_types::api::ReactionCounts;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn reaction(message_id: i64, count: i64) -> BoardEvent {
        let mut reactions = ReactionCounts::new();
        reactions.insert("👍".to_string(), count);
        BoardEvent::ReactionUpdated {
            message_id,
            reactions,
        }
    }

    #[test]
    fn broadcast_without_subscribers_is_fine() {
        let dispatcher = Dispatcher::new();
        dispatcher.broadcast(reaction(1, 1));
    }

    #[test]
    fn every_subscriber_gets_every_event() {
        let dispatcher = Dispatcher::new();
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();

        dispatcher.publish(reaction(1, 1));

        for rx in [&mut a, &mut b] {
            let got = rx.try_recv().unwrap();
            assert_eq!(*got.event, reaction(1, 1));
            let json: serde_json::Value = serde_json::from_str(&got.json).unwrap();
            assert_eq!(json["type"], "reaction-updated");
        }
    }

    #[test]
    fn late_subscriber_sees_no_backlog() {
        let dispatcher = Dispatcher::new();
        let _early = dispatcher.subscribe();
        dispatcher.broadcast(reaction(1, 1));

        let mut late = dispatcher.subscribe();
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn lagging_subscriber_does_not_hold_back_others() {
        let dispatcher = Dispatcher::with_capacity(2);
        let mut slow = dispatcher.subscribe();
        let mut fast = dispatcher.subscribe();

        for i in 0..4 {
            dispatcher.broadcast(reaction(i, 1));
            assert_eq!(fast.recv().await.unwrap().event.message_id(), i);
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(2))));
        assert_eq!(slow.recv().await.unwrap().event.message_id(), 2);
    }

    #[test]
    fn viewer_count_tracks_connections() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.viewer_connected(), 1);
        assert_eq!(dispatcher.viewer_connected(), 2);
        assert_eq!(dispatcher.viewer_disconnected(), 1);
        assert_eq!(dispatcher.viewer_count(), 1);
    }
}
