//! Typed event bus with explicit subscription handles.
//!
//! Every event stream in the crate (transport, manager, session) is an
//! [`EventBus`] over a closed event enum. Subscribing returns a
//! [`Subscription`] that owns its receiver; calling
//! [`Subscription::unsubscribe`] or dropping it detaches the subscriber.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
#[cfg(not(feature = "transport"))]
use std::sync::mpsc;

/// Identifier of a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

type Subscribers<E> = Arc<Mutex<HashMap<SubscriptionId, Sink<E>>>>;

/// Delivery target of one subscriber.
enum Sink<E> {
    Channel(Sender<E>),
    Callback(Box<dyn Fn(&E) + Send + Sync>),
}

/// Unbounded sender that works both inside and outside a tokio runtime.
#[cfg(feature = "transport")]
type Sender<E> = tokio::sync::mpsc::UnboundedSender<E>;
#[cfg(not(feature = "transport"))]
type Sender<E> = mpsc::Sender<E>;

#[cfg(feature = "transport")]
type Receiver<E> = tokio::sync::mpsc::UnboundedReceiver<E>;
#[cfg(not(feature = "transport"))]
type Receiver<E> = mpsc::Receiver<E>;

/// Fan-out publisher for a closed set of event variants.
pub struct EventBus<E> {
    subscribers: Subscribers<E>,
    next_id: Arc<AtomicU64>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<E> EventBus<E> {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn allocate_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a callback invoked synchronously for every event.
    ///
    /// The callback runs on the publishing task, must not block and must not
    /// call back into the bus.
    pub fn subscribe_fn<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.subscribers
            .lock()
            .insert(id, Sink::Callback(Box::new(callback)));
        id
    }

    /// Remove a subscriber by id. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.lock().remove(&id).is_some()
    }

    /// Remove every subscriber.
    pub fn clear(&self) {
        self.subscribers.lock().clear();
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<E: Clone> EventBus<E> {
    /// Subscribe with a channel receiver.
    pub fn subscribe(&self) -> Subscription<E> {
        let id = self.allocate_id();
        #[cfg(feature = "transport")]
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        #[cfg(not(feature = "transport"))]
        let (tx, rx) = mpsc::channel();

        self.subscribers.lock().insert(id, Sink::Channel(tx));
        Subscription {
            id,
            rx,
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    /// Deliver an event to every subscriber.
    ///
    /// Channel subscribers whose receiver was dropped are pruned.
    pub fn publish(&self, event: E) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|_, sink| match sink {
            Sink::Channel(tx) => tx.send(event.clone()).is_ok(),
            Sink::Callback(callback) => {
                callback(&event);
                true
            }
        });
    }
}

/// Handle to a channel subscription.
pub struct Subscription<E> {
    id: SubscriptionId,
    rx: Receiver<E>,
    subscribers: Subscribers<E>,
}

impl<E> std::fmt::Debug for Subscription<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl<E> Subscription<E> {
    /// The id of this subscription.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event. Returns `None` once the bus is gone or the
    /// subscription was removed.
    #[cfg(feature = "transport")]
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Take the next event without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    /// Detach from the bus. Pending events are discarded.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.subscribers.lock().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq)]
    enum Ping {
        A(u32),
        B,
    }

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(Ping::A(7));

        assert_eq!(first.try_recv(), Some(Ping::A(7)));
        assert_eq!(second.try_recv(), Some(Ping::A(7)));
        assert_eq!(first.try_recv(), None);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(Ping::B);
    }

    #[test]
    fn test_callback_subscription() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = bus.subscribe_fn(move |event: &Ping| {
            if matches!(event, Ping::B) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        bus.publish(Ping::B);
        bus.publish(Ping::A(1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(Ping::B);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_detaches_everyone() {
        let bus: EventBus<Ping> = EventBus::new();
        let mut sub = bus.subscribe();
        bus.clear();
        bus.publish(Ping::B);
        assert_eq!(sub.try_recv(), None);
    }
}
