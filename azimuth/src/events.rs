//! Typed publish/subscribe channel.
//!
//! Used by the layer registry for lifecycle events and by native maps for backend events.
//! Subscribers are keyed by event name and invoked synchronously, in subscription order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Event that can be published on an [`EventChannel`].
pub trait Event {
    /// Name subscribers use to select the event.
    fn name(&self) -> &str;
}

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Subscriber<E> {
    id: u64,
    name: String,
    once: bool,
    listener: Listener<E>,
}

struct ChannelInner<E> {
    subscribers: Mutex<Vec<Subscriber<E>>>,
    next_id: AtomicU64,
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64) -> bool;
}

impl<E> Detach for ChannelInner<E> {
    fn detach(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        subscribers.len() != before
    }
}

/// Handle of one subscription. Dropping it keeps the subscription alive.
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    channel: Weak<dyn Detach>,
}

impl Subscription {
    /// Removes the subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        self.channel
            .upgrade()
            .is_some_and(|channel| channel.detach(self.id))
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Publish/subscribe channel for events of type `E`.
pub struct EventChannel<E> {
    inner: Arc<ChannelInner<E>>,
}

impl<E> Default for EventChannel<E> {
    fn default() -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                subscribers: Mutex::new(vec![]),
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

impl<E: Event + 'static> EventChannel<E> {
    /// Creates a channel without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to every event called `name`.
    pub fn on(
        &self,
        name: impl Into<String>,
        listener: impl Fn(&E) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(name.into(), false, Arc::new(listener))
    }

    /// Subscribes to the next event called `name` only.
    pub fn once(
        &self,
        name: impl Into<String>,
        listener: impl Fn(&E) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(name.into(), true, Arc::new(listener))
    }

    fn subscribe(&self, name: String, once: bool, listener: Listener<E>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push(Subscriber {
            id,
            name,
            once,
            listener,
        });

        let inner: Arc<dyn Detach> = self.inner.clone();
        Subscription {
            id,
            channel: Arc::downgrade(&inner),
        }
    }

    /// Delivers `event` to its subscribers and returns how many were invoked.
    ///
    /// The subscriber list is snapshotted before delivery and no lock is held while listeners
    /// run, so listeners may subscribe, unsubscribe or clear the channel. A listener removed
    /// during delivery may still receive the event being delivered. A panicking listener is
    /// logged and does not stop delivery to the others.
    pub fn emit(&self, event: &E) -> usize {
        let listeners: Vec<Listener<E>> = {
            let mut subscribers = self.inner.subscribers.lock();
            let matching = subscribers
                .iter()
                .filter(|subscriber| subscriber.name == event.name())
                .map(|subscriber| subscriber.listener.clone())
                .collect();
            subscribers.retain(|subscriber| !(subscriber.once && subscriber.name == event.name()));
            matching
        };

        for listener in &listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                log::error!("Listener of `{}` panicked", event.name());
            }
        }

        listeners.len()
    }

    /// Removes every subscriber.
    pub fn clear(&self) {
        self.inner.subscribers.lock().clear();
    }

    /// Number of subscribers of events called `name`.
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.inner
            .subscribers
            .lock()
            .iter()
            .filter(|subscriber| subscriber.name == name)
            .count()
    }

    /// Whether the channel has no subscribers at all.
    pub fn is_empty(&self) -> bool {
        self.inner.subscribers.lock().is_empty()
    }
}
