use crate::core::energy::term::{DerivedQuantities, MarkRef};
use crate::core::image::stack::{BackgroundStack, VoxelStats};
use crate::core::models::ids::{MarkId, ordered_pair};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Identifies one cached term value. Pair keys always hold the smaller id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    Unary {
        mark: MarkId,
        term: usize,
    },
    Pair {
        first: MarkId,
        second: MarkId,
        term: usize,
    },
}

impl CacheKey {
    pub fn unary(mark: MarkId, term: usize) -> Self {
        CacheKey::Unary { mark, term }
    }

    pub fn pair(a: MarkId, b: MarkId, term: usize) -> Self {
        let (first, second) = ordered_pair(a, b);
        CacheKey::Pair {
            first,
            second,
            term,
        }
    }

    pub fn term(&self) -> usize {
        match *self {
            CacheKey::Unary { term, .. } | CacheKey::Pair { term, .. } => term,
        }
    }

    pub fn mentions(&self, id: MarkId) -> bool {
        match *self {
            CacheKey::Unary { mark, .. } => mark == id,
            CacheKey::Pair { first, second, .. } => first == id || second == id,
        }
    }

    fn marks(&self) -> [Option<MarkId>; 2] {
        match *self {
            CacheKey::Unary { mark, .. } => [Some(mark), None],
            CacheKey::Pair { first, second, .. } => [Some(first), Some(second)],
        }
    }
}

type Slot<V> = Arc<Mutex<Option<V>>>;

/// A map whose values are computed at most once per key, even under concurrent first access.
///
/// The outer lock is held only to find or create a key's slot; the computation runs
/// under the slot's own lock, so distinct keys compute in parallel.
#[derive(Debug)]
struct OnceMap<K, V> {
    slots: RwLock<HashMap<K, Slot<V>>>,
}

impl<K, V> Default for OnceMap<K, V> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Copy + Eq + Hash, V: Copy> OnceMap<K, V> {
    fn slot(&self, key: K) -> Slot<V> {
        if let Some(slot) = self.slots.read().get(&key) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(slots.entry(key).or_default())
    }

    /// Returns the cached value, computing it with `compute` if absent.
    ///
    /// The flag is `true` when this call performed the computation. Errors are not cached.
    fn get_or_try_compute<E>(
        &self,
        key: K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<(V, bool), E> {
        let slot = self.slot(key);
        let mut value = slot.lock();
        if let Some(cached) = *value {
            return Ok((cached, false));
        }
        let computed = compute()?;
        *value = Some(computed);
        Ok((computed, true))
    }

    fn get(&self, key: &K) -> Option<V> {
        self.slots.read().get(key).and_then(|slot| *slot.lock())
    }

    fn insert(&self, key: K, value: V) {
        self.slots
            .write()
            .insert(key, Arc::new(Mutex::new(Some(value))));
    }

    fn remove(&self, key: &K) -> bool {
        self.slots.write().remove(key).is_some()
    }

    fn retain(&self, mut keep: impl FnMut(&K) -> bool) {
        self.slots.write().retain(|key, _| keep(key));
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.slots
            .read()
            .iter()
            .filter_map(|(key, slot)| slot.lock().map(|v| (*key, v)))
            .collect()
    }

    fn clear(&self) {
        self.slots.write().clear();
    }
}

/// Lazily computed term values and derived per-mark quantities.
///
/// Every entry is keyed by the marks it depends on, so a change to one mark
/// invalidates exactly the entries mentioning that mark. Stored values are unweighted
/// term scores.
#[derive(Debug, Default)]
pub struct EnergyCache {
    scores: OnceMap<CacheKey, f64>,
    stats: OnceMap<MarkId, VoxelStats>,
    shared: OnceMap<(MarkId, MarkId), u64>,
    dependents: Mutex<HashMap<MarkId, HashSet<CacheKey>>>,
    computations: AtomicU64,
}

impl EnergyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key`, computing and caching it on first access.
    pub fn score<E>(
        &self,
        key: CacheKey,
        compute: impl FnOnce() -> Result<f64, E>,
    ) -> Result<f64, E> {
        let (value, computed) = self.scores.get_or_try_compute(key, compute)?;
        if computed {
            self.computations.fetch_add(1, Ordering::Relaxed);
            self.register(key);
        }
        Ok(value)
    }

    pub fn get(&self, key: &CacheKey) -> Option<f64> {
        self.scores.get(key)
    }

    /// Stores a value computed elsewhere, e.g. during the evaluation of an accepted proposal.
    pub fn install(&self, key: CacheKey, value: f64) {
        self.scores.insert(key, value);
        self.register(key);
    }

    /// Drops every entry that mentions `id`. Returns the number of term values removed.
    pub fn invalidate_mark(&self, id: MarkId) -> usize {
        let keys = {
            let mut dependents = self.dependents.lock();
            let keys = dependents.remove(&id).unwrap_or_default();
            for key in &keys {
                for other in key.marks().into_iter().flatten().filter(|m| *m != id) {
                    if let Some(set) = dependents.get_mut(&other) {
                        set.remove(key);
                    }
                }
            }
            keys
        };
        let mut removed = 0;
        for key in &keys {
            if self.scores.remove(key) {
                removed += 1;
            }
        }
        self.stats.remove(&id);
        self.shared.retain(|(a, b)| *a != id && *b != id);
        removed
    }

    pub fn clear(&self) {
        self.scores.clear();
        self.stats.clear();
        self.shared.clear();
        self.dependents.lock().clear();
    }

    /// All cached term values in key order.
    pub fn snapshot(&self) -> BTreeMap<CacheKey, f64> {
        self.scores.entries().into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.scores.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of term values computed through [`score`](Self::score) so far.
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }

    fn register(&self, key: CacheKey) {
        let mut dependents = self.dependents.lock();
        for id in key.marks().into_iter().flatten() {
            dependents.entry(id).or_default().insert(key);
        }
    }
}

impl DerivedQuantities for EnergyCache {
    fn voxel_stats(&self, mark: MarkRef<'_>, stack: &BackgroundStack) -> VoxelStats {
        if !mark.is_published() {
            return stack.stats_within(mark.mark);
        }
        let computed: Result<_, std::convert::Infallible> = self
            .stats
            .get_or_try_compute(mark.id, || Ok(stack.stats_within(mark.mark)));
        match computed {
            Ok((stats, _)) => stats,
            Err(never) => match never {},
        }
    }

    fn shared_voxels(&self, a: MarkRef<'_>, b: MarkRef<'_>, stack: &BackgroundStack) -> u64 {
        if !(a.is_published() && b.is_published()) {
            return stack.count_within_both(a.mark, b.mark);
        }
        let computed: Result<_, std::convert::Infallible> = self
            .shared
            .get_or_try_compute(ordered_pair(a.id, b.id), || {
                Ok(stack.count_within_both(a.mark, b.mark))
            });
        match computed {
            Ok((count, _)) => count,
            Err(never) => match never {},
        }
    }
}
