//! Eviction scoring.
//!
//! A scorer maps an item to a comparable score; **lower means more
//! evictable**. Scorers are pure and cheap — the eviction loop may call one
//! up to `candidates × items_to_prune` times for a single overflowing
//! insert — so the policy is a tagged variant dispatched by `match` rather
//! than a trait object.

use std::str::FromStr;

use crate::error::ConfigError;
use crate::item::{Item, NANOS_PER_SEC};

/// The victim-selection policy, chosen at configuration time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalPolicy {
    /// Fewest gets since insertion.
    Lfu,
    /// Oldest last access (Unix seconds).
    Lru,
    /// `access_count / age / size` — frequency per second, discounted by
    /// the item's own cost.
    Hyperbolic,
    /// `access_count / age / req_size` — like hyperbolic, but discounted by
    /// the EWMA request payload size.
    H1,
    /// `access_count / age / missing_size` — discounted by the last
    /// observed miss cost.
    H2,
}

impl EvalPolicy {
    /// Scores `item` under this policy.
    pub(crate) fn score<V>(self, item: &Item<V>) -> f64 {
        match self {
            EvalPolicy::Lfu => item.access_count() as f64,
            EvalPolicy::Lru => (item.access_ts_nanos() / NANOS_PER_SEC) as f64,
            EvalPolicy::Hyperbolic => {
                hits_per_sec(item) / (item.size() as f64).max(f64::MIN_POSITIVE)
            }
            EvalPolicy::H1 => hits_per_sec(item) / item.req_info().req_size.max(f64::MIN_POSITIVE),
            EvalPolicy::H2 => {
                hits_per_sec(item) / item.req_info().missing_size.max(f64::MIN_POSITIVE)
            }
        }
    }
}

/// Access frequency since insertion. Age is floored at 1 ns by
/// [`Item::age`], so the division is always defined.
#[inline]
fn hits_per_sec<V>(item: &Item<V>) -> f64 {
    item.access_count() as f64 / item.age().as_secs_f64()
}

impl FromStr for EvalPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lfu" => Ok(EvalPolicy::Lfu),
            "lru" => Ok(EvalPolicy::Lru),
            "hyperbolic" => Ok(EvalPolicy::Hyperbolic),
            "h1" => Ok(EvalPolicy::H1),
            "h2" => Ok(EvalPolicy::H2),
            _ => Err(ConfigError::UnknownAlgorithm(s.to_string())),
        }
    }
}
