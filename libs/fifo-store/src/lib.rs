//! Fixed-capacity ordered map with first-in-first-out eviction.
//!
//! Order is insertion order. Reads never reposition an entry and neither does
//! overwriting an existing key: only removal or eviction moves the oldest mark.

pub mod error;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};

pub use error::StoreError;

struct Slot<V> {
    seq: u64,
    value: V,
}

struct Inner<K, V> {
    entries: HashMap<K, Slot<V>>,
    /// Insertion sequence → key. The first entry is the oldest.
    order: BTreeMap<u64, K>,
    next_seq: u64,
}

impl<K: Hash + Eq + Clone, V> Inner<K, V> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            // Large capacities are allocated lazily.
            entries: HashMap::with_capacity(capacity.min(1024)),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn evict_oldest(&mut self) -> Option<(K, V)> {
        let (_, key) = self.order.pop_first()?;
        let slot = self.entries.remove(&key)?;
        Some((key, slot.value))
    }

    /// Insert a key that is known to be absent. Evicts the oldest entry first
    /// when the store is full.
    fn insert_new(&mut self, capacity: usize, key: K, value: V) -> Option<(K, V)> {
        let evicted = if self.entries.len() >= capacity {
            self.evict_oldest()
        } else {
            None
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.entries.insert(key, Slot { seq, value });
        evicted
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.seq);
        Some(slot.value)
    }
}

/// Concurrency-safe bounded FIFO map.
///
/// Locking discipline:
/// - `get`, `contains_key`, `len`, snapshots: shared read lock
/// - `set`, `remove`, `clear`, `trim_excess`: exclusive write lock
/// - `try_add`, `get_or_add`: upgradable read, upgraded only when the key is absent
pub struct BoundedFifoStore<K, V> {
    capacity: usize,
    inner: RwLock<Inner<K, V>>,
}

impl<K, V> fmt::Debug for BoundedFifoStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedFifoStore")
            .field("capacity", &self.capacity)
            .field("len", &self.inner.read().entries.len())
            .finish()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> BoundedFifoStore<K, V> {
    pub fn new(capacity: usize) -> Result<Self, StoreError> {
        if capacity == 0 {
            return Err(StoreError::Config(
                "bounded store capacity must be positive".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            inner: RwLock::new(Inner::with_capacity(capacity)),
        })
    }

    /// Create a store seeded with `entries`, inserted in iteration order.
    ///
    /// Fails when the seed holds more distinct keys than `capacity`. A repeated
    /// key keeps its last value and its first position.
    pub fn with_entries(
        capacity: usize,
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, StoreError> {
        let entries: Vec<(K, V)> = entries.into_iter().collect();
        let distinct = entries.iter().map(|(key, _)| key).collect::<HashSet<_>>().len();
        if distinct > capacity {
            return Err(StoreError::Config(format!(
                "seed of {distinct} keys exceeds capacity {capacity}"
            )));
        }
        let store = Self::new(capacity)?;
        for (key, value) in entries {
            store.set(key, value);
        }
        Ok(store)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().entries.get(key).map(|slot| slot.value.clone())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.read().entries.contains_key(key)
    }

    /// Insert or overwrite.
    ///
    /// An existing key keeps its position. A new key goes to the newest
    /// position, evicting the oldest entry if the store is full. Returns the
    /// evicted entry.
    pub fn set(&self, key: K, value: V) -> Option<(K, V)> {
        let mut inner = self.inner.write();
        if let Some(slot) = inner.entries.get_mut(&key) {
            slot.value = value;
            return None;
        }
        let evicted = inner.insert_new(self.capacity, key, value);
        if evicted.is_some() {
            tracing::trace!(capacity = self.capacity, "evicted oldest entry");
        }
        evicted
    }

    /// Insert only if absent. Returns `false` when the key is already present.
    pub fn try_add(&self, key: K, value: V) -> bool {
        self.insert_if_absent(key, value).is_ok()
    }

    /// Insert only if absent.
    ///
    /// `Ok` carries the entry evicted to make room, `Err` the value already
    /// stored under `key`.
    pub fn insert_if_absent(&self, key: K, value: V) -> Result<Option<(K, V)>, V> {
        let guard = self.inner.upgradable_read();
        if let Some(slot) = guard.entries.get(&key) {
            return Err(slot.value.clone());
        }
        let mut inner = RwLockUpgradableReadGuard::upgrade(guard);
        let evicted = inner.insert_new(self.capacity, key, value);
        if evicted.is_some() {
            tracing::trace!(capacity = self.capacity, "evicted oldest entry");
        }
        Ok(evicted)
    }

    /// Return the existing value, or insert the one produced by `factory`.
    ///
    /// `factory` runs at most once, under the write lock, so concurrent callers
    /// for the same key all observe the single winning value.
    pub fn get_or_add(&self, key: K, factory: impl FnOnce() -> V) -> V {
        let guard = self.inner.upgradable_read();
        if let Some(slot) = guard.entries.get(&key) {
            return slot.value.clone();
        }
        let mut inner = RwLockUpgradableReadGuard::upgrade(guard);
        let value = factory();
        if inner
            .insert_new(self.capacity, key, value.clone())
            .is_some()
        {
            tracing::trace!(capacity = self.capacity, "evicted oldest entry");
        }
        value
    }

    pub fn remove(&self, key: &K) -> bool {
        self.inner.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Release memory held by removed entries. Does not change contents or order.
    pub fn trim_excess(&self) {
        self.inner.write().entries.shrink_to_fit();
    }

    /// The entry that would be evicted next.
    pub fn oldest(&self) -> Option<(K, V)> {
        let inner = self.inner.read();
        let (_, key) = inner.order.first_key_value()?;
        let slot = inner.entries.get(key)?;
        Some((key.clone(), slot.value.clone()))
    }

    /// Keys, oldest first.
    pub fn keys(&self) -> Vec<K> {
        self.inner.read().order.values().cloned().collect()
    }

    /// Values, oldest first.
    pub fn values(&self) -> Vec<V> {
        let inner = self.inner.read();
        inner
            .order
            .values()
            .filter_map(|key| inner.entries.get(key).map(|slot| slot.value.clone()))
            .collect()
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<(K, V)> {
        let inner = self.inner.read();
        inner
            .order
            .values()
            .filter_map(|key| {
                inner
                    .entries
                    .get(key)
                    .map(|slot| (key.clone(), slot.value.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store(capacity: usize) -> BoundedFifoStore<&'static str, i32> {
        BoundedFifoStore::new(capacity).unwrap()
    }

    #[test]
    fn overflow_evicts_first_inserted() {
        let s = store(2);
        assert!(s.set("a", 1).is_none());
        assert!(s.set("b", 2).is_none());
        assert_eq!(s.set("c", 3), Some(("a", 1)));
        assert_eq!(s.keys(), vec!["b", "c"]);
        assert_eq!(s.get(&"a"), None);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn reads_do_not_reposition() {
        let s = store(2);
        s.set("a", 1);
        s.set("b", 2);
        for _ in 0..5 {
            assert_eq!(s.get(&"a"), Some(1));
        }
        s.set("c", 3);
        assert!(!s.contains_key(&"a"));
        assert!(s.contains_key(&"b"));
    }

    #[test]
    fn overwrite_keeps_position() {
        let s = store(2);
        s.set("a", 1);
        s.set("b", 2);
        assert!(s.set("a", 10).is_none());
        assert_eq!(s.entries(), vec![("a", 10), ("b", 2)]);
        s.set("c", 3);
        assert_eq!(s.keys(), vec!["b", "c"]);
    }

    #[test]
    fn try_add_only_inserts_absent_keys() {
        let s = store(2);
        assert!(s.try_add("a", 1));
        assert!(!s.try_add("a", 2));
        assert_eq!(s.get(&"a"), Some(1));
        assert!(s.try_add("b", 2));
        assert!(s.try_add("c", 3));
        assert_eq!(s.keys(), vec!["b", "c"]);
    }

    #[test]
    fn insert_if_absent_reports_winner_and_eviction() {
        let s = store(1);
        assert_eq!(s.insert_if_absent("a", 1), Ok(None));
        assert_eq!(s.insert_if_absent("a", 9), Err(1));
        assert_eq!(s.insert_if_absent("b", 2), Ok(Some(("a", 1))));
        assert_eq!(s.entries(), vec![("b", 2)]);
    }

    #[test]
    fn get_or_add_runs_factory_once() {
        let s = store(4);
        let calls = AtomicUsize::new(0);
        let first = s.get_or_add("a", || {
            calls.fetch_add(1, Ordering::SeqCst);
            7
        });
        let second = s.get_or_add("a", || {
            calls.fetch_add(1, Ordering::SeqCst);
            8
        });
        assert_eq!((first, second), (7, 7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_and_clear() {
        let s = store(3);
        s.set("a", 1);
        s.set("b", 2);
        s.set("c", 3);
        assert!(s.remove(&"b"));
        assert!(!s.remove(&"b"));
        assert_eq!(s.values(), vec![1, 3]);
        assert_eq!(s.oldest(), Some(("a", 1)));
        s.trim_excess();
        assert_eq!(s.keys(), vec!["a", "c"]);
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.oldest(), None);
    }

    #[test]
    fn removal_frees_a_slot_without_eviction() {
        let s = store(2);
        s.set("a", 1);
        s.set("b", 2);
        s.remove(&"a");
        assert!(s.set("c", 3).is_none());
        assert_eq!(s.keys(), vec!["b", "c"]);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = BoundedFifoStore::<u32, u32>::new(0).unwrap_err();
        assert!(err.to_string().contains("capacity"));
    }

    #[test]
    fn oversized_seed_is_rejected() {
        let err = BoundedFifoStore::with_entries(1, [("a", 1), ("b", 2)]).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));

        let s = BoundedFifoStore::with_entries(2, [("a", 1), ("b", 2)]).unwrap();
        assert_eq!(s.keys(), vec!["a", "b"]);
    }

    #[test]
    fn repeated_seed_keys_count_once() {
        let s = BoundedFifoStore::with_entries(2, [("a", 1), ("a", 2), ("b", 3)]).unwrap();
        assert_eq!(s.keys(), vec!["a", "b"]);
        assert_eq!(s.get(&"a"), Some(2));
        assert_eq!(s.len(), 2);

        let err = BoundedFifoStore::with_entries(2, [("a", 1), ("b", 2), ("c", 3), ("a", 4)])
            .unwrap_err();
        assert!(err.to_string().contains("3 keys"));
    }

    #[test]
    fn concurrent_get_or_add_has_single_winner() {
        let s = BoundedFifoStore::<u32, usize>::new(8).unwrap();
        let calls = AtomicUsize::new(0);
        let results: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let s = &s;
                    let calls = &calls;
                    scope.spawn(move || {
                        s.get_or_add(1, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            i
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn concurrent_inserts_never_exceed_capacity() {
        let s = BoundedFifoStore::<u32, u32>::new(16).unwrap();
        std::thread::scope(|scope| {
            for t in 0..4 {
                let s = &s;
                scope.spawn(move || {
                    for i in 0..500 {
                        s.set(t * 1000 + i, i);
                        assert!(s.len() <= 16);
                    }
                });
            }
        });
        assert_eq!(s.len(), 16);
        assert_eq!(s.keys().len(), 16);
    }
}
