//! Error types for the cache contract
//!
//! Provides unified error handling using thiserror.
//!
//! Only malformed input is an error. Storage-layer failures are reported
//! through `false` or the caller's default value, never through `Err`.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for every backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A key, or the container of a batch call, has the wrong shape
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// A TTL interval string could not be parsed
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),
}

impl CacheError {
    /// Shorthand for an `InvalidKey` error.
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        CacheError::InvalidKey(msg.into())
    }

    /// Returns true for `InvalidKey`.
    pub fn is_invalid_key(&self) -> bool {
        matches!(self, CacheError::InvalidKey(_))
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
