//! Error types for the lungo library.
//!
//! Two things can go wrong outside of a caller-supplied fetcher: naming an
//! eviction algorithm the cache does not know, and handing [`parse_key`] a
//! string that was not produced by [`build_key`]. Fetcher failures are not
//! represented here — [`Cache::fetch`] is generic over the fetcher's own
//! error type and propagates it untouched.
//!
//! [`parse_key`]: crate::parse_key
//! [`build_key`]: crate::build_key
//! [`Cache::fetch`]: crate::Cache::fetch

use std::fmt;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when a configuration value cannot be interpreted.
///
/// Produced by [`EvalPolicy::from_str`](crate::EvalPolicy); the panicking
/// builder setter [`CacheBuilder::eval_algorithm`] reports the same
/// condition fatally.
///
/// [`CacheBuilder::eval_algorithm`]: crate::CacheBuilder::eval_algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The eval-algorithm name is not one of `lfu`, `lru`, `hyperbolic`,
    /// `h1`, `h2`.
    UnknownAlgorithm(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownAlgorithm(name) => {
                write!(f, "unrecognized evaluation algorithm: {name:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// KeyParseError
// ---------------------------------------------------------------------------

/// Error returned when a page key does not have the `"{backend}:{uri}"`
/// shape produced by [`build_key`](crate::build_key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyParseError {
    key: String,
}

impl KeyParseError {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        KeyParseError { key: key.into() }
    }

    /// The offending key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for KeyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed page key: {:?}", self.key)
    }
}

impl std::error::Error for KeyParseError {}
