use std::sync::atomic::Ordering;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use rand::Rng;

use crate::item::Item;
use crate::score::EvalPolicy;

// ---------------------------------------------------------------------------
// Shard
// ---------------------------------------------------------------------------

/// One concurrently accessible slice of the cache.
///
/// A shard pairs a key→slot map with a dense array of item owners, both
/// protected by a single reader/writer lock. The dense array is what makes
/// sampled eviction cheap: a uniformly random slot is a uniformly random
/// item, in O(1), with no global ordering structure to contend on.
///
/// Invariant, for every key `k` in the map:
/// `arr[map[k]].key == k` and `arr[map[k]].idx == map[k]`; and
/// `map.len() == arr.len()`. Every structural mutation below preserves it.
///
/// Cache-line aligned to prevent false sharing between neighboring shards.
#[repr(align(64))]
pub(crate) struct Shard<V> {
    inner: RwLock<ShardInner<V>>,
    init_capacity: usize,
    /// EWMA weight applied to the incoming item's `req_size` on replace.
    update_ratio: f64,
}

struct ShardInner<V> {
    map: AHashMap<Box<str>, usize>,
    arr: Vec<Arc<Item<V>>>,
}

impl<V> ShardInner<V> {
    fn with_capacity(capacity: usize) -> Self {
        ShardInner {
            map: AHashMap::with_capacity(capacity),
            arr: Vec::with_capacity(capacity),
        }
    }
}

impl<V> Shard<V> {
    pub(crate) fn new(init_capacity: usize, update_ratio: f64) -> Self {
        Shard {
            inner: RwLock::new(ShardInner::with_capacity(init_capacity)),
            init_capacity,
            update_ratio,
        }
    }

    /// Returns the item for `key`, recording the access.
    ///
    /// Counter updates go through the item's atomics, so the read lock is
    /// enough and concurrent gets do not serialize.
    pub(crate) fn get(&self, key: &str) -> Option<Arc<Item<V>>> {
        let inner = self.inner.read();
        let idx = *inner.map.get(key)?;
        let item = Arc::clone(&inner.arr[idx]);
        item.touch();
        Some(item)
    }

    /// Inserts `item`, returning `(item, replaced)`.
    ///
    /// A replace reuses the existing slot (the dense array does not move)
    /// and blends the new item's request metadata with the displaced one's.
    pub(crate) fn set(&self, item: Arc<Item<V>>) -> (Arc<Item<V>>, Option<Arc<Item<V>>>) {
        let mut inner = self.inner.write();
        match inner.map.get(item.key()).copied() {
            Some(idx) => {
                item.idx.store(idx, Ordering::Relaxed);
                let old = std::mem::replace(&mut inner.arr[idx], Arc::clone(&item));
                item.mix_req_info(&old, self.update_ratio);
                (item, Some(old))
            }
            None => {
                let idx = inner.arr.len();
                item.idx.store(idx, Ordering::Relaxed);
                inner.arr.push(Arc::clone(&item));
                inner.map.insert(Box::from(item.key()), idx);
                (item, None)
            }
        }
    }

    /// Removes `key` via swap-and-pop, keeping the array dense.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<Item<V>>> {
        let mut inner = self.inner.write();
        let idx = inner.map.remove(key)?;
        Some(Self::swap_pop(&mut inner, idx))
    }

    /// Removes `item` only if it still owns its slot.
    ///
    /// The eviction loop samples under the read lock and deletes afterwards;
    /// in between, the item may have been deleted or replaced by a
    /// concurrent writer. Deleting by key alone would then remove (and
    /// mis-account) the successor, so the slot is re-checked by pointer
    /// identity under the write lock. Returns `false` when the item is no
    /// longer resident.
    pub(crate) fn remove_exact(&self, item: &Arc<Item<V>>) -> bool {
        let mut inner = self.inner.write();
        let Some(idx) = inner.map.get(item.key()).copied() else {
            return false;
        };
        if !Arc::ptr_eq(&inner.arr[idx], item) {
            return false;
        }
        inner.map.remove(item.key());
        Self::swap_pop(&mut inner, idx);
        true
    }

    /// Pops the item at `idx` after swapping it with the array tail,
    /// patching the moved tail's slot index and map entry. The caller has
    /// already removed `idx`'s own map entry.
    fn swap_pop(inner: &mut ShardInner<V>, idx: usize) -> Arc<Item<V>> {
        let last = inner.arr.len() - 1;
        inner.arr.swap(idx, last);
        if idx != last {
            let moved = &inner.arr[idx];
            moved.idx.store(idx, Ordering::Relaxed);
            inner.map.insert(Box::from(moved.key()), idx);
        }
        let item = inner.arr.pop().expect("swap_pop on empty shard");
        item.idx.store(usize::MAX, Ordering::Relaxed);
        item
    }

    /// Draws one uniformly random item and its score under `policy`.
    ///
    /// Returns `None` for an empty shard; the eviction loop treats that as
    /// a consumed candidate slot.
    pub(crate) fn candidate(&self, policy: EvalPolicy) -> Option<(Arc<Item<V>>, f64)> {
        let inner = self.inner.read();
        if inner.arr.is_empty() {
            return None;
        }
        let idx = rand::rng().random_range(0..inner.arr.len());
        let item = Arc::clone(&inner.arr[idx]);
        let score = policy.score(&item);
        Some((item, score))
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().arr.len()
    }

    /// Drops every item and resets both structures to the initial capacity.
    pub(crate) fn clear(&self) {
        *self.inner.write() = ShardInner::with_capacity(self.init_capacity);
    }

    /// Asserts the map/array cross-invariants. Test-only.
    #[cfg(test)]
    fn check_invariants(&self) {
        let inner = self.inner.read();
        assert_eq!(inner.map.len(), inner.arr.len());
        for (i, item) in inner.arr.iter().enumerate() {
            assert_eq!(item.idx.load(Ordering::Relaxed), i, "idx out of sync");
            assert_eq!(inner.map.get(item.key()), Some(&i), "map out of sync");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
