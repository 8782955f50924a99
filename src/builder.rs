use crate::cache::Cache;
use crate::item::Item;
use crate::listener::{DeleteListener, FnListener, RemovalCause};
use crate::score::EvalPolicy;
use crate::weigher::{FnWeigher, UnitWeigher, Weigher};

/// Builder for configuring and constructing a [`Cache`].
///
/// Every option has a sensible default; setters are fluent. Out-of-range
/// values are ignored and the previous setting kept — the one fatal
/// configuration error is an unrecognized algorithm name passed to
/// [`eval_algorithm`](CacheBuilder::eval_algorithm).
///
/// # Example
/// ```
/// use lungo::{Cache, CacheBuilder};
///
/// let cache: Cache<String> = CacheBuilder::new()
///     .max_size(10_000)
///     .buckets(32)
///     .eval_algorithm("hyperbolic")
///     .build();
/// ```
pub struct CacheBuilder<V> {
    pub(crate) max_size: i64,
    pub(crate) buckets: usize,
    pub(crate) candidates: usize,
    pub(crate) items_to_prune: usize,
    pub(crate) init_bucket_size: usize,
    pub(crate) update_ratio: f64,
    pub(crate) count_per_sampling: u64,
    pub(crate) tracking: bool,
    pub(crate) admission_policy: bool,
    pub(crate) admission_threshold: i64,
    pub(crate) policy: EvalPolicy,
    pub(crate) weigher: Box<dyn Weigher<V>>,
    pub(crate) listener: Option<Box<dyn DeleteListener<V>>>,
}

impl<V: 'static> CacheBuilder<V> {
    pub fn new() -> Self {
        CacheBuilder {
            max_size: 5_000,
            buckets: 16,
            candidates: 10,
            items_to_prune: 500,
            init_bucket_size: 512,
            update_ratio: 0.3,
            count_per_sampling: 1_000,
            tracking: false,
            admission_policy: false,
            admission_threshold: 0,
            policy: EvalPolicy::Lfu,
            weigher: Box::new(UnitWeigher),
            listener: None,
        }
    }

    /// Target upper bound on total item size (default: 5000, must be ≥ 1).
    ///
    /// The bound is approximate under concurrent writers; see the eviction
    /// notes on [`Cache`].
    pub fn max_size(mut self, max: i64) -> Self {
        if max >= 1 {
            self.max_size = max;
        }
        self
    }

    /// Shard count (default: 16). Keys are hashed across shards so writers
    /// contend per shard, not globally. Must be a power of two; anything
    /// else falls back to 16.
    pub fn buckets(mut self, count: usize) -> Self {
        self.buckets = if count.is_power_of_two() { count } else { 16 };
        self
    }

    /// Items sampled per eviction round (default: 10, capped at the shard
    /// count).
    pub fn candidates(mut self, count: usize) -> Self {
        if count <= self.buckets {
            self.candidates = count;
        }
        self
    }

    /// Minimum eviction rounds once an insert overshoots the budget
    /// (default: 500). Batching eviction work amortizes the per-call alias
    /// table build.
    pub fn items_to_prune(mut self, count: usize) -> Self {
        self.items_to_prune = count;
        self
    }

    /// Initial per-shard array capacity (default: 512, must be ≥ 1).
    pub fn init_bucket_size(mut self, size: usize) -> Self {
        if size > 0 {
            self.init_bucket_size = size;
        }
        self
    }

    /// EWMA weight given to the incoming `req_size` when a value is
    /// replaced (default: 0.3, must be within `[0, 1]`).
    pub fn update_ratio(mut self, ratio: f64) -> Self {
        if (0.0..=1.0).contains(&ratio) {
            self.update_ratio = ratio;
        }
        self
    }

    /// Reserved: accesses between alias-table rebuilds (default: 1000,
    /// must be ≥ 1). Accepted for configuration compatibility; the current
    /// eviction loop rebuilds once per call regardless.
    pub fn count_per_sampling(mut self, count: u64) -> Self {
        if count > 0 {
            self.count_per_sampling = count;
        }
        self
    }

    /// Enables ref-count pinning: items held by a live
    /// [`Tracked`](crate::Tracked) guard are skipped by eviction.
    pub fn track(mut self) -> Self {
        self.tracking = true;
        self
    }

    /// Enables the admission policy: a page insert whose miss cost both
    /// overflows the budget and exceeds the admission threshold is dropped
    /// without touching the cache.
    pub fn admission_policy(mut self) -> Self {
        self.admission_policy = true;
        self
    }

    /// Size threshold consulted by the admission policy (must be ≥ 0).
    pub fn admission_threshold(mut self, threshold: i64) -> Self {
        if threshold >= 0 {
            self.admission_threshold = threshold;
        }
        self
    }

    /// Selects the eviction scorer by name: one of `lfu`, `lru`,
    /// `hyperbolic`, `h1`, `h2` (default: `lfu`).
    ///
    /// # Panics
    /// On an unrecognized name — a misconfigured eviction policy is a
    /// deployment error, not a runtime condition.
    pub fn eval_algorithm(mut self, name: &str) -> Self {
        match name.parse::<EvalPolicy>() {
            Ok(policy) => self.policy = policy,
            Err(err) => panic!("{err}"),
        }
        self
    }

    /// Selects the eviction scorer by variant; the non-panicking sibling of
    /// [`eval_algorithm`](CacheBuilder::eval_algorithm).
    pub fn eval_policy(mut self, policy: EvalPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Registers a delete listener closure, called on the mutating thread
    /// each time an item leaves the cache (eviction, replacement, or
    /// explicit delete). Do **not** call cache methods from within it.
    pub fn on_delete<F>(mut self, f: F) -> Self
    where
        F: Fn(&Item<V>, RemovalCause) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(FnListener(f)));
        self
    }

    /// Registers a delete listener via the [`DeleteListener`] trait.
    pub fn on_delete_impl<L: DeleteListener<V>>(mut self, l: L) -> Self {
        self.listener = Some(Box::new(l));
        self
    }

    /// Sets a custom item weigher via closure. The returned size is clamped
    /// to ≥ 1.
    pub fn weigher<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &V) -> i64 + Send + Sync + 'static,
    {
        self.weigher = Box::new(FnWeigher(f));
        self
    }

    /// Sets a weigher using any type that implements the [`Weigher`] trait.
    pub fn weigher_impl<W: Weigher<V>>(mut self, w: W) -> Self {
        self.weigher = Box::new(w);
        self
    }
}

impl<V: 'static> Default for CacheBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CacheBuilder<V>
where
    V: Send + Sync + 'static,
{
    pub fn build(self) -> Cache<V> {
        Cache::from_builder(self)
    }
}
