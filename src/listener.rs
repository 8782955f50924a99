//! Delete listener — a callback invoked whenever an item leaves the cache.
//!
//! The listener receives the full evicted [`Item`], so teardown code can
//! reach the key, the value, and the request metadata in one place.
//!
//! # Example
//! ```
//! use lungo::{Cache, CacheBuilder};
//! use lungo::listener::RemovalCause;
//! use std::time::Duration;
//!
//! let cache: Cache<String> = CacheBuilder::new()
//!     .max_size(2)
//!     .on_delete(|item: &lungo::Item<String>, cause| {
//!         println!("dropped {} ({cause:?})", item.key());
//!     })
//!     .build();
//!
//! cache.set("a", "1".to_string(), Duration::from_secs(60));
//! cache.delete("a"); // fires with RemovalCause::Explicit
//! ```

use crate::item::Item;

// ---------------------------------------------------------------------------
// RemovalCause
// ---------------------------------------------------------------------------

/// Why an item was removed from the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalCause {
    /// Chosen as a victim by the sampled eviction loop while the cache was
    /// over budget.
    Capacity,
    /// Displaced by a `set` on the same key.
    Replaced,
    /// Removed via [`Cache::delete`].
    ///
    /// [`Cache::delete`]: crate::Cache::delete
    Explicit,
}

// ---------------------------------------------------------------------------
// DeleteListener trait
// ---------------------------------------------------------------------------

/// A callback invoked each time an item is evicted, replaced, or deleted.
///
/// The callback runs on the thread that triggered the removal — an
/// admitting `set`, the eviction loop it runs, or an explicit `delete` —
/// and always **outside** any shard lock. It must still be quick: on the
/// admission path it delays the caller.
///
/// **Do not call cache methods from inside the listener.** A re-entrant
/// `set` would recurse into the eviction loop.
pub trait DeleteListener<V>: Send + Sync + 'static {
    fn on_delete(&self, item: &Item<V>, cause: RemovalCause);
}

/// A [`DeleteListener`] backed by a closure.
///
/// Created via [`CacheBuilder::on_delete`](crate::CacheBuilder::on_delete).
pub struct FnListener<F>(pub F);

impl<V, F> DeleteListener<V> for FnListener<F>
where
    F: Fn(&Item<V>, RemovalCause) + Send + Sync + 'static,
{
    fn on_delete(&self, item: &Item<V>, cause: RemovalCause) {
        (self.0)(item, cause)
    }
}
