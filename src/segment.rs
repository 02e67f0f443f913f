//! Shared Segment Backend
//!
//! Thin adapter over a host-local shared-memory key/value segment that several
//! processes attach to. Per-key atomicity comes from the segment itself; this
//! layer adds no locking of its own.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::CacheBackend;
use crate::config::BackendConfig;
use crate::error::Result;
use crate::key::{validate, validate_batch, AsCacheKey, BatchInput};
use crate::multi;
use crate::ttl::Ttl;

// == Segment Client ==
/// An already-attached segment handle, owned by the host application.
///
/// `ttl` arguments use the native dual encoding produced by
/// [`Ttl::native_expiry`]: `0` never expires, negative values have already
/// expired, small values are relative seconds and large values are absolute
/// Unix timestamps.
pub trait SegmentClient {
    /// Returns the stored value, or None if absent or expired.
    fn fetch(&self, key: &str) -> Option<Value>;

    /// Stores a value; false if the segment refused it.
    fn store(&self, key: &str, value: &Value, ttl: i64) -> bool;

    /// Removes a key; false if nothing was removed.
    fn delete(&self, key: &str) -> bool;

    /// Returns whether a live entry exists.
    fn exists(&self, key: &str) -> bool;

    /// Drops every entry in the segment.
    fn clear(&self) -> bool;

    /// Native batch store returning the keys that failed.
    ///
    /// None means the segment has no batch primitive.
    fn store_many(&self, _entries: &[(String, Value)], _ttl: i64) -> Option<Vec<String>> {
        None
    }

    /// Native batch delete returning the keys that were not removed.
    ///
    /// None means the segment has no batch primitive.
    fn delete_many(&self, _keys: &[String]) -> Option<Vec<String>> {
        None
    }
}

impl<C: SegmentClient + ?Sized> SegmentClient for &C {
    fn fetch(&self, key: &str) -> Option<Value> {
        (**self).fetch(key)
    }

    fn store(&self, key: &str, value: &Value, ttl: i64) -> bool {
        (**self).store(key, value, ttl)
    }

    fn delete(&self, key: &str) -> bool {
        (**self).delete(key)
    }

    fn exists(&self, key: &str) -> bool {
        (**self).exists(key)
    }

    fn clear(&self) -> bool {
        (**self).clear()
    }

    fn store_many(&self, entries: &[(String, Value)], ttl: i64) -> Option<Vec<String>> {
        (**self).store_many(entries, ttl)
    }

    fn delete_many(&self, keys: &[String]) -> Option<Vec<String>> {
        (**self).delete_many(keys)
    }
}

impl<C: SegmentClient + ?Sized> SegmentClient for Arc<C> {
    fn fetch(&self, key: &str) -> Option<Value> {
        (**self).fetch(key)
    }

    fn store(&self, key: &str, value: &Value, ttl: i64) -> bool {
        (**self).store(key, value, ttl)
    }

    fn delete(&self, key: &str) -> bool {
        (**self).delete(key)
    }

    fn exists(&self, key: &str) -> bool {
        (**self).exists(key)
    }

    fn clear(&self) -> bool {
        (**self).clear()
    }

    fn store_many(&self, entries: &[(String, Value)], ttl: i64) -> Option<Vec<String>> {
        (**self).store_many(entries, ttl)
    }

    fn delete_many(&self, keys: &[String]) -> Option<Vec<String>> {
        (**self).delete_many(keys)
    }
}

// == Shared Segment Backend ==
/// Cache backed by a shared segment handle.
#[derive(Debug)]
pub struct SharedSegmentBackend<C> {
    client: C,
    config: BackendConfig,
}

impl<C: SegmentClient> SharedSegmentBackend<C> {
    // == Constructor ==
    pub fn new(client: C) -> Self {
        Self::with_config(client, BackendConfig::default())
    }

    /// Wraps an attached segment handle.
    ///
    /// # Arguments
    /// * `client` - The segment handle; the host keeps ownership of its lifecycle
    /// * `config` - Backend settings, e.g. the TTL used when none is given
    pub fn with_config(client: C, config: BackendConfig) -> Self {
        Self { client, config }
    }

    /// Returns the underlying segment handle.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Gives the segment handle back to the host.
    pub fn into_inner(self) -> C {
        self.client
    }

    fn native_ttl(&self, ttl: Ttl) -> i64 {
        self.config.effective_ttl(ttl).native_expiry(Utc::now())
    }

    /// A key the segment did not delete still counts as deleted if it is gone.
    fn is_gone(&self, key: &str) -> bool {
        !self.client.exists(key)
    }
}

impl<C: SegmentClient> CacheBackend for SharedSegmentBackend<C> {
    fn get<K: AsCacheKey>(&mut self, key: K, default: Value) -> Result<Value> {
        let key = validate(&key)?;
        Ok(self.client.fetch(key).unwrap_or(default))
    }

    fn set<K, V, T>(&mut self, key: K, value: V, ttl: T) -> Result<bool>
    where
        K: AsCacheKey,
        V: Into<Value>,
        T: Into<Ttl>,
    {
        let key = validate(&key)?;
        let ttl = self.native_ttl(ttl.into());

        let stored = self.client.store(key, &value.into(), ttl);
        if !stored {
            warn!(key, "segment refused store");
        }
        Ok(stored)
    }

    fn delete<K: AsCacheKey>(&mut self, key: K) -> Result<bool> {
        let key = validate(&key)?;
        Ok(self.client.delete(key) || self.is_gone(key))
    }

    fn clear(&mut self) -> bool {
        self.client.clear()
    }

    fn has<K: AsCacheKey>(&mut self, key: K) -> Result<bool> {
        let key = validate(&key)?;
        Ok(self.client.exists(key))
    }

    fn set_multiple<B, K, V, T>(&mut self, values: B, ttl: T) -> Result<bool>
    where
        B: BatchInput<Item = (K, V)>,
        K: AsCacheKey,
        V: Into<Value>,
        T: Into<Ttl>,
    {
        let mut entries = Vec::new();
        for (key, value) in validate_batch(values, "values")? {
            entries.push((validate(&key)?.to_owned(), value.into()));
        }
        let ttl = ttl.into();

        match self.client.store_many(&entries, self.native_ttl(ttl)) {
            Some(failed) if failed.is_empty() => Ok(true),
            Some(failed) => {
                warn!(failed = failed.len(), "segment refused part of a batch store");
                Ok(false)
            }
            None => {
                debug!("segment has no batch store, storing keys one by one");
                multi::set_each(entries, ttl, |key, value, ttl| self.set(key, value, ttl))
            }
        }
    }

    fn delete_multiple<B>(&mut self, keys: B) -> Result<bool>
    where
        B: BatchInput,
        B::Item: AsCacheKey,
    {
        let keys = validate_batch(keys, "keys")?
            .map(|key| validate(&key).map(str::to_owned))
            .collect::<Result<Vec<_>>>()?;

        match self.client.delete_many(&keys) {
            Some(failed) => {
                let remaining = failed.iter().filter(|key| !self.is_gone(key)).count();
                if remaining > 0 {
                    warn!(remaining, "segment kept keys after a batch delete");
                }
                Ok(remaining == 0)
            }
            None => {
                debug!("segment has no batch delete, deleting keys one by one");
                multi::delete_each(keys, |key| self.delete(key))
            }
        }
    }
}
