use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::builder::CacheBuilder;
use crate::item::{Item, ReqInfo, Tracked};
use crate::listener::{DeleteListener, RemovalCause};
use crate::metrics::stats::{Metrics, StatsCounter};
use crate::sampler::AliasTable;
use crate::score::EvalPolicy;
use crate::shard::Shard;
use crate::weigher::Weigher;

// ---------------------------------------------------------------------------
// Shard selection
// ---------------------------------------------------------------------------

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a. Every operation on a key must land on the same shard, so
/// the hash is pinned rather than seeded per process.
#[inline]
pub(crate) fn fnv1a_32(key: &str) -> u32 {
    let mut h = FNV_OFFSET_BASIS;
    for b in key.bytes() {
        h ^= u32::from(b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Bound on extra eviction rounds beyond `items_to_prune` in a single
/// `evict()` call. Only binds in degenerate states: `candidates == 0`, or
/// racing inserts holding `size` over budget while every draw misses.
const EVICTION_ROUND_SLACK: usize = 1024;

// ---------------------------------------------------------------------------
// Cache interior
// ---------------------------------------------------------------------------

/// Shared interior of a [`Cache`].
struct Inner<V> {
    shards: Box<[Shard<V>]>,
    /// Always `shards.len() - 1`; the shard count is a power of two.
    bucket_mask: u32,
    /// Sum of live item sizes. Transiently off by one admission or
    /// eviction step under concurrent mutation.
    size: AtomicI64,
    max_size: i64,
    /// Samples drawn per eviction round.
    candidates: usize,
    /// Minimum eviction rounds per overshooting admission.
    items_to_prune: usize,
    policy: EvalPolicy,
    /// When set, pinned items (positive ref count) are never evicted.
    tracking: bool,
    /// `Some(threshold)` when the admission policy is enabled.
    admission_threshold: Option<i64>,
    weigher: Box<dyn Weigher<V>>,
    /// Optional delete listener. `None` if the user didn't register one.
    listener: Option<Box<dyn DeleteListener<V>>>,
    metrics: StatsCounter,
}

// ---------------------------------------------------------------------------
// Cache handle
// ---------------------------------------------------------------------------

/// A sharded, bounded, in-memory object cache with sampling-based eviction.
///
/// Keys hash to one of `buckets` shards (FNV-1a), each holding its items in
/// a dense array that supports O(1) uniform random sampling. When an insert
/// pushes the total size over `max_size`, the admitting thread immediately
/// runs the eviction loop: it repeatedly draws `candidates` items — shards
/// chosen with probability proportional to their population via an alias
/// table — and deletes the worst-scoring one, until the cache is back under
/// budget and at least `items_to_prune` rounds have run. There is no
/// background worker, no global ordering structure, and therefore no global
/// contention point; the bound on `size` is approximate under concurrency.
///
/// # Example
/// ```
/// use lungo::{Cache, CacheBuilder};
/// use std::time::Duration;
///
/// let cache: Cache<String> = CacheBuilder::new().max_size(1_000).build();
/// cache.set("power", "9000".to_string(), Duration::from_secs(60));
/// let item = cache.get("power").unwrap();
/// assert_eq!(item.value().as_str(), "9000");
/// ```
pub struct Cache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Cache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Cache<V>
where
    V: Send + Sync + 'static,
{
    pub(crate) fn from_builder(builder: CacheBuilder<V>) -> Self {
        let shards: Vec<Shard<V>> = (0..builder.buckets)
            .map(|_| Shard::new(builder.init_bucket_size, builder.update_ratio))
            .collect();
        // count_per_sampling is a reserved rebuild-throttle knob; the alias
        // table is rebuilt once per evict() call instead.
        let _ = builder.count_per_sampling;
        Cache {
            inner: Arc::new(Inner {
                shards: shards.into_boxed_slice(),
                bucket_mask: (builder.buckets - 1) as u32,
                size: AtomicI64::new(0),
                max_size: builder.max_size,
                candidates: builder.candidates,
                items_to_prune: builder.items_to_prune,
                policy: builder.policy,
                tracking: builder.tracking,
                admission_threshold: builder
                    .admission_policy
                    .then_some(builder.admission_threshold),
                weigher: builder.weigher,
                listener: builder.listener,
                metrics: StatsCounter::new(),
            }),
        }
    }

    /// Returns a [`CacheBuilder`] for constructing a new cache.
    pub fn builder() -> CacheBuilder<V> {
        CacheBuilder::new()
    }

    #[inline]
    fn shard(&self, key: &str) -> &Shard<V> {
        &self.inner.shards[(fnv1a_32(key) & self.inner.bucket_mask) as usize]
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Returns the item for `key`, or `None` on a miss.
    ///
    /// An **expired** item is still returned — check [`Item::expired`] to
    /// decide whether to honor it, or use [`fetch`](Cache::fetch), which
    /// treats staleness as a miss.
    pub fn get(&self, key: &str) -> Option<Arc<Item<V>>> {
        let item = self.shard(key).get(key);
        match &item {
            Some(_) => self.inner.metrics.record_hit(),
            None => self.inner.metrics.record_miss(),
        }
        item
    }

    /// Like [`get`](Cache::get), but the returned guard pins the item.
    ///
    /// While the cache was built with [`track`](CacheBuilder::track), a
    /// pinned item is never selected for eviction. A miss yields a sentinel
    /// guard with no value that reports itself expired.
    pub fn tracking_get(&self, key: &str) -> Tracked<V> {
        match self.get(key) {
            Some(item) => Tracked::hit(item),
            None => Tracked::miss(),
        }
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Inserts `value` for `key` with the given TTL, evicting as needed.
    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        self.set_arc(key, Arc::new(value), None, ttl);
    }

    /// Like [`set`](Cache::set), carrying request metadata for the `h1`/`h2`
    /// scorers. On replace, `req_size` is EWMA-blended with the displaced
    /// item's (weight `update_ratio`).
    pub fn set_with_info(&self, key: &str, value: V, req: ReqInfo, ttl: Duration) {
        self.set_arc(key, Arc::new(value), Some(req), ttl);
    }

    /// Replaces the value for `key` only if it is cached, keeping the
    /// item's remaining TTL. Returns `false` (without inserting) otherwise.
    ///
    /// Replacing an already-expired item keeps it expired: the remaining
    /// TTL floors at zero.
    pub fn replace(&self, key: &str, value: V) -> bool {
        let Some(existing) = self.shard(key).get(key) else {
            return false;
        };
        self.set_arc(key, Arc::new(value), None, existing.ttl());
        true
    }

    /// [`replace`](Cache::replace) with explicit request metadata.
    pub fn replace_with_info(&self, key: &str, req: ReqInfo, value: V) -> bool {
        let Some(existing) = self.shard(key).get(key) else {
            return false;
        };
        self.set_arc(key, Arc::new(value), Some(req), existing.ttl());
        true
    }

    /// Returns the cached item if present and fresh; otherwise runs
    /// `fetch`, caches its value under `ttl`, and returns the new item.
    ///
    /// A fetcher error is propagated and nothing is cached.
    pub fn fetch<F, E>(&self, key: &str, ttl: Duration, fetch: F) -> Result<Arc<Item<V>>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(item) = self.get(key) {
            if !item.expired() {
                return Ok(item);
            }
        }
        let value = fetch()?;
        Ok(self.set_arc(key, Arc::new(value), None, ttl))
    }

    /// Removes `key`. Returns `true` if it was present; the delete listener
    /// fires exactly once per resident item removed.
    pub fn delete(&self, key: &str) -> bool {
        match self.shard(key).remove(key) {
            Some(item) => {
                self.after_delete(&item, RemovalCause::Explicit);
                true
            }
            None => false,
        }
    }

    /// Removes every item and resets the size counter.
    ///
    /// Not safe under concurrent use: the per-shard clears and the counter
    /// reset are not one atomic step. Meant for tests and single-threaded
    /// teardown. The delete listener does not fire.
    pub fn clear(&self) {
        for shard in self.inner.shards.iter() {
            shard.clear();
        }
        self.inner.size.store(0, Ordering::Relaxed);
    }

    /// A no-op kept for API compatibility. Eviction runs inline on the
    /// mutating callers; there is no background worker to stop.
    pub fn stop(&self) {}

    // -----------------------------------------------------------------------
    // Admission bookkeeping + eviction
    // -----------------------------------------------------------------------

    pub(crate) fn set_arc(
        &self,
        key: &str,
        value: Arc<V>,
        req: Option<ReqInfo>,
        ttl: Duration,
    ) -> Arc<Item<V>> {
        let size = self.weigh(key, &value);
        let req = req.unwrap_or_else(|| ReqInfo::for_size(size));
        let item = Arc::new(Item::new(key, value, size, req, ttl));
        let (item, replaced) = self.shard(key).set(item);
        if let Some(old) = replaced {
            self.after_delete(&old, RemovalCause::Replaced);
        }
        self.inner.size.fetch_add(item.size(), Ordering::Relaxed);
        self.evict();
        item
    }

    pub(crate) fn weigh(&self, key: &str, value: &V) -> i64 {
        self.inner.weigher.weigh(key, value).max(1)
    }

    /// Admission-policy gate for page inserts: a batch whose miss cost both
    /// overflows the budget and exceeds the threshold is dropped whole.
    pub(crate) fn page_rejected(&self, missing_size: i64) -> bool {
        let Some(threshold) = self.inner.admission_threshold else {
            return false;
        };
        let projected = self.inner.size.load(Ordering::Relaxed) + missing_size;
        if projected > self.inner.max_size && missing_size > threshold {
            self.inner.metrics.record_rejection();
            return true;
        }
        false
    }

    /// Size bookkeeping and listener dispatch for any item leaving the
    /// cache. Runs outside every shard lock.
    fn after_delete(&self, item: &Arc<Item<V>>, cause: RemovalCause) {
        self.inner.size.fetch_sub(item.size(), Ordering::Relaxed);
        if cause == RemovalCause::Capacity {
            self.inner.metrics.record_eviction();
        }
        if let Some(listener) = &self.inner.listener {
            listener.on_delete(item, cause);
        }
    }

    /// The sampled eviction loop, run inline on the admitting thread.
    ///
    /// The alias table over shard populations is built once per call and
    /// deliberately allowed to go stale within it; a draw that lands on a
    /// since-drained shard just yields no candidate. Likewise a victim that
    /// was deleted or replaced between sampling and deletion makes the
    /// round a no-op — later rounds re-sample.
    fn evict(&self) {
        let inner = &*self.inner;
        if inner.size.load(Ordering::Relaxed) <= inner.max_size {
            return;
        }

        let populations: Vec<usize> = inner.shards.iter().map(Shard::len).collect();
        let table = AliasTable::build(&populations);
        let mut rng = rand::rng();

        let max_rounds = inner.items_to_prune.saturating_add(EVICTION_ROUND_SLACK);
        let mut round = 0usize;
        while (inner.size.load(Ordering::Relaxed) > inner.max_size
            || round < inner.items_to_prune)
            && round < max_rounds
        {
            let mut best: Option<(Arc<Item<V>>, f64, usize)> = None;
            for _ in 0..inner.candidates {
                let s = table.sample(rng.random::<f64>());
                let Some((item, score)) = inner.shards[s].candidate(inner.policy) else {
                    // An empty draw consumes its candidate slot; that keeps
                    // the round finite when the cache is nearly empty yet
                    // still over budget.
                    continue;
                };
                if inner.tracking && item.ref_count() > 0 {
                    continue; // pinned
                }
                // Strict `<` so ties go to the first candidate seen.
                let better = match &best {
                    Some((_, best_score, _)) => score < *best_score,
                    None => true,
                };
                if better {
                    best = Some((item, score, s));
                }
            }
            if let Some((victim, _, s)) = best {
                if inner.shards[s].remove_exact(&victim) {
                    self.after_delete(&victim, RemovalCause::Capacity);
                }
            }
            round += 1;
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Current total item size. Approximate while writers are active.
    pub fn size(&self) -> i64 {
        self.inner.size.load(Ordering::Relaxed)
    }

    /// Number of items across all shards.
    pub fn item_count(&self) -> usize {
        self.inner.shards.iter().map(Shard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }

    pub fn stats(&self) -> Metrics {
        self.inner.metrics.snapshot()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
