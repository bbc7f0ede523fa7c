//! Deferred-apply collections.
//!
//! Membership changes are proposed from any thread (typically entity event
//! callbacks) but become visible to readers only when the consuming thread
//! calls `apply_changes`. Readers of the committed view never observe a
//! half-applied batch.
//!
//! Pending changes are kept as an ordered op log, not a pair of add/remove
//! sets: replaying the log at apply time gives last-writer-wins per key in
//! wall-clock call order. Insert then remove of the same key leaves it
//! absent; remove then insert leaves the inserted value.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Mutex, RwLock};

enum MapOp<K, V> {
    Insert(K, V),
    Remove(K),
}

/// A map whose writes stage into a pending op log until applied.
///
/// `insert`/`remove` are callable from any thread and never block readers of
/// the committed view. `apply_changes` is contractually single-caller (the
/// designated consumer thread); concurrent applies will not corrupt state
/// but make cross-batch ordering ambiguous.
pub struct DeferredMap<K, V> {
    committed: RwLock<HashMap<K, V>>,
    pending: Mutex<Vec<MapOp<K, V>>>,
}

impl<K: Hash + Eq, V> Default for DeferredMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq, V> DeferredMap<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Stage an insert. Not visible until the next `apply_changes`.
    pub fn insert(&self, key: K, value: V) {
        self.pending.lock().unwrap().push(MapOp::Insert(key, value));
    }

    /// Stage a removal. Not visible until the next `apply_changes`.
    pub fn remove(&self, key: K) {
        self.pending.lock().unwrap().push(MapOp::Remove(key));
    }

    /// Commit all staged changes, in the order they were staged.
    ///
    /// A no-op when nothing is pending.
    pub fn apply_changes(&self) {
        let ops = {
            let mut pending = self.pending.lock().unwrap();
            if pending.is_empty() {
                return;
            }
            std::mem::take(&mut *pending)
        };

        let mut committed = self.committed.write().unwrap();
        for op in ops {
            match op {
                MapOp::Insert(key, value) => {
                    committed.insert(key, value);
                }
                MapOp::Remove(key) => {
                    committed.remove(&key);
                }
            }
        }
    }

    /// Drop both committed and pending state immediately. Teardown path;
    /// needs no `apply_changes`.
    pub fn clear(&self) {
        self.pending.lock().unwrap().clear();
        self.committed.write().unwrap().clear();
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.committed.read().unwrap().contains_key(key)
    }

    /// Committed entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.committed.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.committed.read().unwrap().is_empty()
    }

    /// Staged, not-yet-applied op count.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl<K: Hash + Eq, V: Clone> DeferredMap<K, V> {
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.committed.read().unwrap().get(key).cloned()
    }

    /// Snapshot of the committed values as of the last apply.
    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.committed.read().unwrap().values().cloned().collect()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> DeferredMap<K, V> {
    /// Snapshot of the committed entries as of the last apply.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.committed
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

enum SetOp<T> {
    Insert(T),
    Remove(T),
}

/// Set flavor of [`DeferredMap`]: same staging discipline over a `HashSet`.
pub struct DeferredSet<T> {
    committed: RwLock<HashSet<T>>,
    pending: Mutex<Vec<SetOp<T>>>,
}

impl<T: Hash + Eq> Default for DeferredSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Hash + Eq> DeferredSet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(HashSet::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, value: T) {
        self.pending.lock().unwrap().push(SetOp::Insert(value));
    }

    pub fn remove(&self, value: T) {
        self.pending.lock().unwrap().push(SetOp::Remove(value));
    }

    pub fn apply_changes(&self) {
        let ops = {
            let mut pending = self.pending.lock().unwrap();
            if pending.is_empty() {
                return;
            }
            std::mem::take(&mut *pending)
        };

        let mut committed = self.committed.write().unwrap();
        for op in ops {
            match op {
                SetOp::Insert(value) => {
                    committed.insert(value);
                }
                SetOp::Remove(value) => {
                    committed.remove(&value);
                }
            }
        }
    }

    pub fn clear(&self) {
        self.pending.lock().unwrap().clear();
        self.committed.write().unwrap().clear();
    }

    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        self.committed.read().unwrap().contains(value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.committed.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.committed.read().unwrap().is_empty()
    }
}

impl<T: Hash + Eq + Clone> DeferredSet<T> {
    /// Snapshot of the committed members as of the last apply.
    #[must_use]
    pub fn iter_committed(&self) -> Vec<T> {
        self.committed.read().unwrap().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn insert_invisible_until_apply() {
        let map = DeferredMap::new();
        map.insert("x", 1);
        assert!(!map.contains_key(&"x"));
        assert_eq!(map.pending_len(), 1);

        map.apply_changes();
        assert_eq!(map.get(&"x"), Some(1));
        assert_eq!(map.pending_len(), 0);
        assert_eq!(map.snapshot(), vec![("x", 1)]);
    }

    #[test]
    fn insert_from_background_thread_invisible_until_apply() {
        let map = Arc::new(DeferredMap::new());

        let writer = Arc::clone(&map);
        std::thread::spawn(move || writer.insert("x", 1))
            .join()
            .unwrap();

        assert!(map.values().is_empty());
        map.apply_changes();
        assert_eq!(map.values(), vec![1]);
    }

    #[test]
    fn last_writer_wins_insert_then_remove() {
        let map = DeferredMap::new();
        map.insert("x", 1);
        map.remove("x");
        map.apply_changes();
        assert!(!map.contains_key(&"x"));
    }

    #[test]
    fn last_writer_wins_remove_then_insert() {
        let map = DeferredMap::new();
        map.insert("x", 1);
        map.apply_changes();

        map.remove("x");
        map.insert("x", 2);
        map.apply_changes();
        assert_eq!(map.get(&"x"), Some(2));
    }

    #[test]
    fn apply_is_idempotent_with_no_pending_changes() {
        let map = DeferredMap::new();
        map.insert("x", 1);
        map.apply_changes();

        let before = map.snapshot();
        map.apply_changes();
        map.apply_changes();
        assert_eq!(map.snapshot(), before);
    }

    #[test]
    fn remove_of_absent_key_is_harmless() {
        let map: DeferredMap<&str, i32> = DeferredMap::new();
        map.remove("ghost");
        map.apply_changes();
        assert!(map.is_empty());
    }

    #[test]
    fn clear_drops_committed_and_pending() {
        let map = DeferredMap::new();
        map.insert("a", 1);
        map.apply_changes();
        map.insert("b", 2);

        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.pending_len(), 0);

        // Nothing resurfaces on a later apply.
        map.apply_changes();
        assert!(map.is_empty());
    }

    #[test]
    fn concurrent_staging_is_lossless() {
        let map = Arc::new(DeferredMap::new());
        let mut handles = Vec::new();
        for t in 0..4 {
            let map = Arc::clone(&map);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    map.insert(t * 100 + i, ());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        map.apply_changes();
        assert_eq!(map.len(), 400);
    }

    #[test]
    fn set_defers_and_applies() {
        let set = DeferredSet::new();
        set.insert(7);
        assert!(!set.contains(&7));

        set.apply_changes();
        assert!(set.contains(&7));
        assert_eq!(set.iter_committed(), vec![7]);

        set.remove(7);
        assert!(set.contains(&7));
        set.apply_changes();
        assert!(set.is_empty());
    }

    #[test]
    fn set_insert_then_remove_before_apply() {
        let set = DeferredSet::new();
        set.insert("a");
        set.remove("a");
        set.apply_changes();
        assert!(!set.contains(&"a"));
    }
}
