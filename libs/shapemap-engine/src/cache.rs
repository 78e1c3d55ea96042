use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use fifo_store::BoundedFifoStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::compiler::CompiledRoutine;
use crate::error::MapError;
use crate::key::TypePairKey;

/// Storage policy of the routine cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Unbounded,
    /// At most `capacity` routines; the oldest is evicted on overflow.
    Bounded { capacity: usize },
}

/// What happens when two callers build the same pair concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertPolicy {
    /// Every builder gets its own routine; the last one stored wins.
    #[default]
    LastWriteWins,
    /// The first stored routine wins; later builders discard theirs.
    SingleWinner,
}

/// One cached routine, as reported by [`RoutineCache::snapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub key: TypePairKey,
    #[serde(skip)]
    pub routine: Arc<CompiledRoutine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub bounded: bool,
    pub capacity: Option<usize>,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub builds: u64,
    pub evictions: u64,
}

/// Unbounded map that still remembers insertion order for snapshots.
#[derive(Default)]
struct UnboundedStore {
    entries: RwLock<HashMap<TypePairKey, (u64, Arc<CompiledRoutine>)>>,
    next_seq: AtomicU64,
}

impl UnboundedStore {
    fn get(&self, key: &TypePairKey) -> Option<Arc<CompiledRoutine>> {
        self.entries.read().get(key).map(|(_, routine)| routine.clone())
    }

    fn set(&self, key: TypePairKey, routine: Arc<CompiledRoutine>) {
        let mut entries = self.entries.write();
        match entries.get_mut(&key) {
            Some(slot) => slot.1 = routine,
            None => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                entries.insert(key, (seq, routine));
            }
        }
    }

    fn insert_if_absent(
        &self,
        key: TypePairKey,
        routine: Arc<CompiledRoutine>,
    ) -> Result<(), Arc<CompiledRoutine>> {
        let mut entries = self.entries.write();
        if let Some((_, existing)) = entries.get(&key) {
            return Err(existing.clone());
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        entries.insert(key, (seq, routine));
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn clear(&self) {
        self.entries.write().clear();
    }

    fn entries(&self) -> Vec<(TypePairKey, Arc<CompiledRoutine>)> {
        let mut ordered: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(key, (seq, routine))| (*seq, *key, routine.clone()))
            .collect();
        ordered.sort_by_key(|(seq, _, _)| *seq);
        ordered
            .into_iter()
            .map(|(_, key, routine)| (key, routine))
            .collect()
    }
}

enum RoutineStore {
    Unbounded(UnboundedStore),
    Bounded(BoundedFifoStore<TypePairKey, Arc<CompiledRoutine>>),
}

impl RoutineStore {
    fn new(mode: CacheMode) -> Result<Self, MapError> {
        match mode {
            CacheMode::Unbounded => Ok(RoutineStore::Unbounded(UnboundedStore::default())),
            CacheMode::Bounded { capacity } => {
                Ok(RoutineStore::Bounded(BoundedFifoStore::new(capacity)?))
            }
        }
    }

    fn mode(&self) -> CacheMode {
        match self {
            RoutineStore::Unbounded(_) => CacheMode::Unbounded,
            RoutineStore::Bounded(store) => CacheMode::Bounded {
                capacity: store.capacity(),
            },
        }
    }

    fn get(&self, key: &TypePairKey) -> Option<Arc<CompiledRoutine>> {
        match self {
            RoutineStore::Unbounded(store) => store.get(key),
            RoutineStore::Bounded(store) => store.get(key),
        }
    }

    /// Returns `true` when an older entry was evicted.
    fn set(&self, key: TypePairKey, routine: Arc<CompiledRoutine>) -> bool {
        match self {
            RoutineStore::Unbounded(store) => {
                store.set(key, routine);
                false
            }
            RoutineStore::Bounded(store) => store.set(key, routine).is_some(),
        }
    }

    /// `Ok(evicted?)` when stored, `Err(existing)` when another routine won.
    fn insert_if_absent(
        &self,
        key: TypePairKey,
        routine: Arc<CompiledRoutine>,
    ) -> Result<bool, Arc<CompiledRoutine>> {
        match self {
            RoutineStore::Unbounded(store) => store.insert_if_absent(key, routine).map(|()| false),
            RoutineStore::Bounded(store) => store
                .insert_if_absent(key, routine)
                .map(|evicted| evicted.is_some()),
        }
    }

    fn len(&self) -> usize {
        match self {
            RoutineStore::Unbounded(store) => store.len(),
            RoutineStore::Bounded(store) => store.len(),
        }
    }

    fn clear(&self) {
        match self {
            RoutineStore::Unbounded(store) => store.clear(),
            RoutineStore::Bounded(store) => store.clear(),
        }
    }

    fn entries(&self) -> Vec<(TypePairKey, Arc<CompiledRoutine>)> {
        match self {
            RoutineStore::Unbounded(store) => store.entries(),
            RoutineStore::Bounded(store) => store.entries(),
        }
    }
}

/// Get-or-build cache of compiled routines keyed by type pair.
///
/// The active store sits behind its own lock so [`RoutineCache::set_mode`]
/// can swap it while other threads keep mapping. A caller that raced a mode
/// switch may insert into the retired store; its routine is still returned.
pub struct RoutineCache {
    store: RwLock<Arc<RoutineStore>>,
    policy: InsertPolicy,
    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
    evictions: AtomicU64,
}

impl Default for RoutineCache {
    fn default() -> Self {
        Self::with_store(
            RoutineStore::Unbounded(UnboundedStore::default()),
            InsertPolicy::default(),
        )
    }
}

impl RoutineCache {
    pub fn new(mode: CacheMode, policy: InsertPolicy) -> Result<Self, MapError> {
        Ok(Self::with_store(RoutineStore::new(mode)?, policy))
    }

    fn with_store(store: RoutineStore, policy: InsertPolicy) -> Self {
        Self {
            store: RwLock::new(Arc::new(store)),
            policy,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            builds: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn active(&self) -> Arc<RoutineStore> {
        self.store.read().clone()
    }

    pub fn policy(&self) -> InsertPolicy {
        self.policy
    }

    /// Return the routine stored for `key`, building and storing it on a miss.
    ///
    /// `build` runs without any cache lock held. Its errors are returned to
    /// this caller and nothing is stored.
    pub fn get_or_build(
        &self,
        key: TypePairKey,
        build: impl FnOnce() -> Result<CompiledRoutine, MapError>,
    ) -> Result<Arc<CompiledRoutine>, MapError> {
        let store = self.active();
        if let Some(routine) = store.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(routine);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let routine = Arc::new(build()?);
        self.builds.fetch_add(1, Ordering::Relaxed);

        match self.policy {
            InsertPolicy::LastWriteWins => {
                if store.set(key, routine.clone()) {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(pair = %key, "evicted oldest routine");
                }
                Ok(routine)
            }
            InsertPolicy::SingleWinner => match store.insert_if_absent(key, routine.clone()) {
                Ok(evicted) => {
                    if evicted {
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(pair = %key, "evicted oldest routine");
                    }
                    Ok(routine)
                }
                Err(existing) => {
                    tracing::trace!(pair = %key, "concurrent build lost, using stored routine");
                    Ok(existing)
                }
            },
        }
    }

    /// Replace the active store. All cached routines are dropped.
    pub fn set_mode(&self, mode: CacheMode) -> Result<(), MapError> {
        let replacement = Arc::new(RoutineStore::new(mode)?);
        let previous = std::mem::replace(&mut *self.store.write(), replacement);
        tracing::info!(
            from = ?previous.mode(),
            to = ?mode,
            dropped = previous.len(),
            "routine cache mode switched, entries cleared"
        );
        Ok(())
    }

    pub fn mode(&self) -> CacheMode {
        self.active().mode()
    }

    pub fn is_bounded(&self) -> bool {
        matches!(self.mode(), CacheMode::Bounded { .. })
    }

    pub fn len(&self) -> usize {
        self.active().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.active().clear();
    }

    /// Cached routines, oldest first.
    pub fn snapshot(&self) -> Vec<CacheEntry> {
        self.active()
            .entries()
            .into_iter()
            .map(|(key, routine)| CacheEntry { key, routine })
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let store = self.active();
        let capacity = match store.mode() {
            CacheMode::Unbounded => None,
            CacheMode::Bounded { capacity } => Some(capacity),
        };
        CacheStats {
            bounded: capacity.is_some(),
            capacity,
            entries: store.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
