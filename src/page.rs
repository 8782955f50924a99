//! Page batch operations.
//!
//! A cached page is addressed by a `(backend, uri)` pair of numeric ids and
//! stored under the canonical key `"{backend}:{uri}"`. Batch gets and sets
//! operate on a slice of [`Request`] records so one page fill is one call;
//! every item set from the same batch shares the batch's request metadata,
//! which is what lets the `h1`/`h2` scorers reason about whole-page cost.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::error::KeyParseError;
use crate::item::ReqInfo;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Canonical cache key for a page object: `"{backend}:{uri}"`, decimal,
/// no padding.
pub fn build_key(backend: u64, uri: u64) -> String {
    format!("{backend}:{uri}")
}

/// Inverse of [`build_key`].
pub fn parse_key(key: &str) -> Result<(u64, u64), KeyParseError> {
    let (backend, uri) = key.split_once(':').ok_or_else(|| KeyParseError::new(key))?;
    let backend = backend.parse().map_err(|_| KeyParseError::new(key))?;
    let uri = uri.parse().map_err(|_| KeyParseError::new(key))?;
    Ok((backend, uri))
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One record of a page batch.
///
/// On [`Cache::get_page`], `obj` is filled in for every hit and left alone
/// for misses; on the set side, records with `obj == None` are skipped.
pub struct Request<V> {
    pub backend: u64,
    pub uri: u64,
    pub obj: Option<Arc<V>>,
}

impl<V> Request<V> {
    /// A lookup record: `obj` starts empty.
    pub fn new(backend: u64, uri: u64) -> Self {
        Request {
            backend,
            uri,
            obj: None,
        }
    }

    /// An insert record carrying its payload.
    pub fn with_obj(backend: u64, uri: u64, obj: V) -> Self {
        Request {
            backend,
            uri,
            obj: Some(Arc::new(obj)),
        }
    }

    fn key(&self) -> String {
        build_key(self.backend, self.uri)
    }
}

// ---------------------------------------------------------------------------
// Batch operations
// ---------------------------------------------------------------------------

impl<V> Cache<V>
where
    V: Send + Sync + 'static,
{
    /// Fills `obj` for every record whose key is cached. Misses leave the
    /// record untouched; like [`get`](Cache::get), expired items are
    /// returned as-is.
    pub fn get_page(&self, reqs: &mut [Request<V>]) {
        for req in reqs {
            if let Some(item) = self.get(&req.key()) {
                req.obj = Some(Arc::clone(item.value()));
            }
        }
    }

    /// Inserts every record carrying an object, all under one shared
    /// [`ReqInfo`] whose `req_size` and `missing_size` are the summed cost
    /// of the batch.
    pub fn set_page(&self, reqs: &[Request<V>], ttl: Duration) {
        let total = self.page_size(reqs) as f64;
        self.insert_page(reqs, ReqInfo::new(total, total), ttl);
    }

    /// Like [`set_page`](Cache::set_page), with the caller's observed miss
    /// cost recorded as the batch's `missing_size`.
    ///
    /// Under the admission policy, a batch that would overflow the budget
    /// while `missing_size` exceeds the threshold is dropped whole: no
    /// mutation, no accounting, no error — the caller simply misses on the
    /// next [`get_page`](Cache::get_page).
    pub fn set_page_with_missing_size(
        &self,
        reqs: &[Request<V>],
        missing_size: i64,
        ttl: Duration,
    ) {
        if self.page_rejected(missing_size) {
            return;
        }
        let total = self.page_size(reqs) as f64;
        self.insert_page(reqs, ReqInfo::new(total, missing_size as f64), ttl);
    }

    /// Summed admission cost of the batch's present objects.
    fn page_size(&self, reqs: &[Request<V>]) -> i64 {
        reqs.iter()
            .filter_map(|req| {
                req.obj
                    .as_deref()
                    .map(|obj| self.weigh(&req.key(), obj))
            })
            .sum()
    }

    fn insert_page(&self, reqs: &[Request<V>], req_info: ReqInfo, ttl: Duration) {
        for req in reqs {
            let Some(obj) = &req.obj else {
                continue;
            };
            self.set_arc(&req.key(), Arc::clone(obj), Some(req_info), ttl);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
