//! Item weigher — assigns an admission cost to each cached value.
//!
//! The cache keeps `Σ size(item)` at or under `max_size` (approximately,
//! see the eviction docs). By default every item costs 1 unit
//! (`UnitWeigher`), so `max_size` is simply a bound on the item count. A
//! custom weigher is how a value "provides a size": register one and
//! `max_size` becomes a bound on total payload cost instead.
//!
//! An item's size is computed once, at insertion, and fixed for its
//! lifetime — mutating a cached value does not re-weigh it.
//!
//! # Example
//! ```
//! use lungo::{Cache, CacheBuilder};
//!
//! // Cap at ~10 MB of page bytes (keys are not counted).
//! let cache: Cache<Vec<u8>> = CacheBuilder::new()
//!     .max_size(10 * 1024 * 1024)
//!     .weigher(|_key: &str, page: &Vec<u8>| page.len() as i64)
//!     .build();
//! ```

/// Computes the admission cost of a cache entry.
///
/// The returned size **must be ≥ 1**; smaller values are clamped so no item
/// escapes capacity accounting.
pub trait Weigher<V>: Send + Sync + 'static {
    fn weigh(&self, key: &str, value: &V) -> i64;
}

// ---------------------------------------------------------------------------
// Built-in implementations
// ---------------------------------------------------------------------------

/// Every item costs exactly 1 unit. This is the default weigher.
pub struct UnitWeigher;

impl<V> Weigher<V> for UnitWeigher {
    #[inline]
    fn weigh(&self, _key: &str, _value: &V) -> i64 {
        1
    }
}

/// A weigher backed by a closure.
///
/// Created via [`CacheBuilder::weigher`](crate::CacheBuilder::weigher).
pub struct FnWeigher<F>(pub F);

impl<V, F> Weigher<V> for FnWeigher<F>
where
    F: Fn(&str, &V) -> i64 + Send + Sync + 'static,
{
    #[inline]
    fn weigh(&self, key: &str, value: &V) -> i64 {
        (self.0)(key, value).max(1)
    }
}
