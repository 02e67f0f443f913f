//! Cache Entry Module
//!
//! Defines the structure for individual in-memory entries with expiry support.

use chrono::{DateTime, Utc};
use serde_json::Value;

// == Cache Entry ==
/// A stored value with its optional expiry instant.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Expiration instant, None = never expires
    pub expires_at: Option<DateTime<Utc>>,
    /// The stored value
    pub value: Value,
}

impl CacheEntry {
    // == Constructor ==
    pub fn new(value: Value, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { expires_at, value }
    }

    // == Is Expired ==
    /// Checks whether the entry is expired at `now`.
    ///
    /// Boundary condition: an entry is expired once `now` reaches its expiry
    /// instant, so a zero TTL is never observable as live.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    /// Checks whether the entry is expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    // == Time To Live ==
    /// Returns the remaining lifetime in whole seconds, or None if it never expires.
    ///
    /// Returns `Some(0)` once the entry has expired.
    pub fn ttl_remaining(&self) -> Option<u64> {
        self.expires_at.map(|expires| {
            let remaining = (expires - Utc::now()).num_seconds();
            u64::try_from(remaining).unwrap_or(0)
        })
    }
}
