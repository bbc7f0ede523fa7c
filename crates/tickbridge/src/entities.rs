//! Entity add/remove event plumbing and the mapped entity cache.
//!
//! An [`EntitySource`] is the host-side stream of entity lifecycle events,
//! modeled as an explicit subscribe/unsubscribe pair rather than ambient
//! callbacks: the subscriber holds its back-reference to the source only
//! while subscribed and must unsubscribe on teardown.
//!
//! [`MappedEntityCache`] is the standard composition over the deferred
//! collections: event threads stage mapped entries, the consumer thread
//! applies and reads them a few at a time per tick.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::deferred::DeferredMap;
use crate::throttle::ThrottledReader;

/// Receives entity lifecycle events. Called on whatever thread the source
/// fires from.
pub trait EntityListener<E>: Send + Sync {
    fn on_added(&self, entity: &E);
    fn on_removed(&self, entity: &E);
}

/// Handle for one subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A stream of entity add/remove events.
pub trait EntitySource<E>: Send + Sync {
    fn subscribe(&self, listener: Arc<dyn EntityListener<E>>) -> ListenerId;
    fn unsubscribe(&self, id: ListenerId);
}

/// In-process [`EntitySource`]: a listener registry plus fan-out calls for
/// the host to invoke when entities come and go.
pub struct EntityHub<E> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn EntityListener<E>>)>>,
}

impl<E> Default for EntityHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EntityHub<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            listeners: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn notify_added(&self, entity: &E) {
        for listener in self.current_listeners() {
            listener.on_added(entity);
        }
    }

    pub fn notify_removed(&self, entity: &E) {
        for listener in self.current_listeners() {
            listener.on_removed(entity);
        }
    }

    // Snapshot outside the registry lock so a listener may unsubscribe
    // from within its own callback.
    fn current_listeners(&self) -> Vec<Arc<dyn EntityListener<E>>> {
        self.listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

impl<E> EntitySource<E> for EntityHub<E> {
    fn subscribe(&self, listener: Arc<dyn EntityListener<E>>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().unwrap().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|(listener_id, _)| *listener_id != id);
    }
}

/// Keeps a mapped projection of a live entity population.
///
/// Subscribes itself to an [`EntitySource`] on construction; event threads
/// stage `key_of(entity) -> map_fn(entity)` entries into a [`DeferredMap`].
/// The consumer thread reads either everything ([`Self::all`]) or a
/// throttled slice per tick ([`Self::take_throttled`]), which amortizes
/// full-collection work across many ticks.
pub struct MappedEntityCache<E, K, V> {
    map: DeferredMap<K, V>,
    reader: Mutex<ThrottledReader<V>>,
    key_of: Box<dyn Fn(&E) -> K + Send + Sync>,
    map_fn: Box<dyn Fn(&E) -> V + Send + Sync>,
    subscription: Mutex<Option<(Arc<dyn EntitySource<E>>, ListenerId)>>,
}

impl<E, K, V> MappedEntityCache<E, K, V>
where
    E: 'static,
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Build the cache and subscribe it to `source`.
    pub fn subscribe(
        source: Arc<dyn EntitySource<E>>,
        key_of: impl Fn(&E) -> K + Send + Sync + 'static,
        map_fn: impl Fn(&E) -> V + Send + Sync + 'static,
    ) -> Arc<Self> {
        let cache = Arc::new(Self {
            map: DeferredMap::new(),
            reader: Mutex::new(ThrottledReader::new()),
            key_of: Box::new(key_of),
            map_fn: Box::new(map_fn),
            subscription: Mutex::new(None),
        });

        let listener: Arc<dyn EntityListener<E>> = Arc::clone(&cache) as _;
        let id = source.subscribe(listener);
        *cache.subscription.lock().unwrap() = Some((source, id));

        cache
    }

    /// Up to `max` values per call. When the previous slice is exhausted,
    /// applies pending changes and refills from the fresh committed values;
    /// otherwise keeps draining the slice it already has.
    pub fn take_throttled(&self, max: usize) -> Vec<V> {
        let mut reader = self.reader.lock().unwrap();
        if reader.is_empty() {
            self.map.apply_changes();
            reader.refill(self.map.values());
        }
        reader.take(max).collect()
    }

    /// Apply pending changes and return the full committed snapshot.
    pub fn all(&self) -> Vec<V> {
        self.map.apply_changes();
        self.map.values()
    }

    /// Committed entry count (as of the last apply).
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Detach from the event source and drop all state. Idempotent; the
    /// cache is inert afterwards (events no longer reach it).
    pub fn close(&self) {
        if let Some((source, id)) = self.subscription.lock().unwrap().take() {
            source.unsubscribe(id);
        }
        self.map.clear();
        self.reader.lock().unwrap().clear();
    }
}

impl<E, K, V> EntityListener<E> for MappedEntityCache<E, K, V>
where
    E: 'static,
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn on_added(&self, entity: &E) {
        let key = (self.key_of)(entity);
        let value = (self.map_fn)(entity);
        self.map.insert(key, value);
    }

    fn on_removed(&self, entity: &E) {
        self.map.remove((self.key_of)(entity));
    }
}
