use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub(crate) const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Wall-clock time as nanoseconds since the Unix epoch.
#[inline]
pub(crate) fn unix_nanos_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos() as i64
}

#[inline]
fn duration_to_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// ReqInfo
// ---------------------------------------------------------------------------

/// Per-key request metadata consumed by the `h1`/`h2` scorers.
///
/// `req_size` is an exponentially-weighted moving average of the request
/// payload size, blended across value replacements; `missing_size` is the
/// last observed cost of a cache miss for this key, when the caller
/// provided one.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReqInfo {
    pub req_size: f64,
    pub missing_size: f64,
}

impl ReqInfo {
    pub fn new(req_size: f64, missing_size: f64) -> Self {
        ReqInfo {
            req_size,
            missing_size,
        }
    }

    /// Default metadata when the caller supplied none: both fields start at
    /// the item's own size.
    pub(crate) fn for_size(size: i64) -> Self {
        let s = size as f64;
        ReqInfo {
            req_size: s,
            missing_size: s,
        }
    }
}

// ---------------------------------------------------------------------------
// F64Cell
// ---------------------------------------------------------------------------

/// An `f64` readable and writable through a shared reference.
///
/// Scorers read request metadata under the shard's *read* lock while `set`
/// mixes it under the write lock, so the cell must not require `&mut`.
struct F64Cell(AtomicU64);

impl F64Cell {
    fn new(v: f64) -> Self {
        F64Cell(AtomicU64::new(v.to_bits()))
    }

    #[inline]
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// The cached-value envelope.
///
/// An item is uniquely owned by the shard holding it; callers receive `Arc`
/// handles from [`Cache::get`] and may outlive the item's residency in the
/// cache. Key, value, size, and creation time are fixed for the item's
/// lifetime; expiry, access counters, and request metadata are mutated
/// atomically so readers never need more than the shard's read lock.
///
/// [`Cache::get`]: crate::Cache::get
pub struct Item<V> {
    key: Box<str>,
    value: Arc<V>,
    size: i64,
    created: Instant,
    /// Absolute expiry, nanoseconds since the Unix epoch.
    expires: AtomicI64,
    /// Number of gets since insertion.
    acc_count: AtomicI64,
    /// Wall-clock time of the last get, nanoseconds since the Unix epoch.
    access_ts: AtomicI64,
    req_size: F64Cell,
    missing_size: F64Cell,
    ref_count: AtomicI32,
    /// Position in the owning shard's dense array. Maintained by the shard
    /// under its write lock; never meaningful outside it.
    pub(crate) idx: AtomicUsize,
}

impl<V> Item<V> {
    pub(crate) fn new(key: &str, value: Arc<V>, size: i64, req: ReqInfo, ttl: Duration) -> Self {
        let now = unix_nanos_now();
        Item {
            key: Box::from(key),
            value,
            size,
            created: Instant::now(),
            expires: AtomicI64::new(now.saturating_add(duration_to_nanos(ttl))),
            acc_count: AtomicI64::new(0),
            access_ts: AtomicI64::new(now),
            req_size: F64Cell::new(req.req_size),
            missing_size: F64Cell::new(req.missing_size),
            ref_count: AtomicI32::new(0),
            idx: AtomicUsize::new(usize::MAX),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Arc<V> {
        &self.value
    }

    /// The item's admission cost, fixed at insertion.
    pub fn size(&self) -> i64 {
        self.size
    }

    /// Returns `true` once the item's expiry has passed.
    ///
    /// [`Cache::get`] still returns expired items; this is how callers
    /// decide whether to honor them.
    ///
    /// [`Cache::get`]: crate::Cache::get
    pub fn expired(&self) -> bool {
        self.expires.load(Ordering::Relaxed) < unix_nanos_now()
    }

    /// Remaining time to live, floored at zero for expired items.
    pub fn ttl(&self) -> Duration {
        let remaining = self.expires.load(Ordering::Relaxed) - unix_nanos_now();
        if remaining <= 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(remaining as u64)
        }
    }

    /// Absolute expiry time.
    pub fn expires_at(&self) -> SystemTime {
        let nanos = self.expires.load(Ordering::Relaxed);
        if nanos <= 0 {
            UNIX_EPOCH
        } else {
            UNIX_EPOCH + Duration::from_nanos(nanos as u64)
        }
    }

    /// Pushes the expiry out to `ttl` from now.
    pub fn extend(&self, ttl: Duration) {
        self.expires.store(
            unix_nanos_now().saturating_add(duration_to_nanos(ttl)),
            Ordering::Relaxed,
        );
    }

    /// Snapshot of the request metadata.
    pub fn req_info(&self) -> ReqInfo {
        ReqInfo {
            req_size: self.req_size.load(),
            missing_size: self.missing_size.load(),
        }
    }

    /// Gets since insertion.
    pub fn access_count(&self) -> i64 {
        self.acc_count.load(Ordering::Relaxed)
    }

    pub(crate) fn access_ts_nanos(&self) -> i64 {
        self.access_ts.load(Ordering::Relaxed)
    }

    /// Time since insertion, floored at one nanosecond so age can safely sit
    /// in a denominator.
    pub(crate) fn age(&self) -> Duration {
        self.created.elapsed().max(Duration::from_nanos(1))
    }

    /// Records a get: bumps the access counter and refreshes the access
    /// timestamp. Called by the shard under its read lock.
    pub(crate) fn touch(&self) {
        self.acc_count.fetch_add(1, Ordering::Relaxed);
        self.access_ts.store(unix_nanos_now(), Ordering::Relaxed);
    }

    /// Blends this item's EWMA request size with the item it replaced:
    /// `new = new * ratio + old * (1 - ratio)`.
    pub(crate) fn mix_req_info(&self, old: &Item<V>, update_ratio: f64) {
        let mixed = self.req_size.load() * update_ratio + old.req_size.load() * (1.0 - update_ratio);
        self.req_size.store(mixed);
    }

    pub(crate) fn track(&self) {
        self.ref_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn release_ref(&self) {
        self.ref_count.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn ref_count(&self) -> i32 {
        self.ref_count.load(Ordering::Relaxed)
    }
}

/// The value is opaque to the cache, so it is elided here rather than
/// requiring `V: Debug`.
impl<V> fmt::Debug for Item<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("key", &self.key)
            .field("size", &self.size)
            .field("expired", &self.expired())
            .field("access_count", &self.access_count())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tracked
// ---------------------------------------------------------------------------

/// A pinned cache entry returned by [`Cache::tracking_get`].
///
/// A hit holds a retain on the item until the guard is dropped (or
/// [`release`](Tracked::release) is called, which is the same thing spelled
/// the way the original API spells it). A miss is a usable sentinel: it has
/// no value, reports itself expired, and ignores `extend`.
///
/// Pins are honored by the eviction loop when the cache was built with
/// tracking enabled — a pinned item is never selected as a victim.
///
/// [`Cache::tracking_get`]: crate::Cache::tracking_get
pub struct Tracked<V> {
    item: Option<Arc<Item<V>>>,
}

impl<V> Tracked<V> {
    pub(crate) fn hit(item: Arc<Item<V>>) -> Self {
        item.track();
        Tracked { item: Some(item) }
    }

    pub(crate) fn miss() -> Self {
        Tracked { item: None }
    }

    /// The pinned value, or `None` for a miss.
    pub fn value(&self) -> Option<&Arc<V>> {
        self.item.as_deref().map(Item::value)
    }

    /// The pinned item, or `None` for a miss.
    pub fn item(&self) -> Option<&Arc<Item<V>>> {
        self.item.as_ref()
    }

    /// A miss is always expired.
    pub fn expired(&self) -> bool {
        self.item.as_deref().map_or(true, Item::expired)
    }

    /// Remaining TTL; a miss reports a nominal one minute.
    pub fn ttl(&self) -> Duration {
        self.item.as_deref().map_or(Duration::from_secs(60), Item::ttl)
    }

    pub fn extend(&self, ttl: Duration) {
        if let Some(item) = &self.item {
            item.extend(ttl);
        }
    }

    /// Drops the pin. Equivalent to letting the guard go out of scope.
    pub fn release(self) {}
}

impl<V> Drop for Tracked<V> {
    fn drop(&mut self) {
        if let Some(item) = &self.item {
            item.release_ref();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
