//! Cache Backend Contract
//!
//! The one interface application code depends on. Every backend honors the
//! same guarantees:
//!
//! - `get` returns the caller's default on any miss and never fails on one.
//! - `set`, `delete` and the batch operations report storage failures as
//!   `false`; only malformed keys or containers produce `Err`.
//! - `delete` of an absent key succeeds.
//! - Batch results are a single boolean: true only if every key succeeded.
//!   Batches are not atomic and nothing is rolled back.
//! - `has` followed by `get` is not atomic; another actor may remove the entry
//!   in between.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::Result;
use crate::key::{AsCacheKey, BatchInput};
use crate::multi;
use crate::ttl::Ttl;

// == Cache Backend ==
/// Uniform key/value cache over one concrete storage engine.
///
/// The batch methods default to the single-key adapter in [`multi`]; backends
/// with native batch calls override them.
pub trait CacheBackend {
    /// Fetches a live value, or `default` on a miss.
    fn get<K: AsCacheKey>(&mut self, key: K, default: Value) -> Result<Value>;

    /// Stores a value unconditionally, overwriting any previous entry.
    fn set<K, V, T>(&mut self, key: K, value: V, ttl: T) -> Result<bool>
    where
        K: AsCacheKey,
        V: Into<Value>,
        T: Into<Ttl>;

    /// Removes an entry. Idempotent.
    fn delete<K: AsCacheKey>(&mut self, key: K) -> Result<bool>;

    /// Removes every entry regardless of TTL state.
    fn clear(&mut self) -> bool;

    /// Returns whether a live entry exists.
    fn has<K: AsCacheKey>(&mut self, key: K) -> Result<bool>;

    /// Fetches many keys; every requested key appears exactly once in the result.
    fn get_multiple<B>(&mut self, keys: B, default: Value) -> Result<HashMap<String, Value>>
    where
        B: BatchInput,
        B::Item: AsCacheKey,
    {
        multi::get_each(keys, default, |key, default| self.get(key, default))
    }

    /// Stores every pair with the same TTL.
    fn set_multiple<B, K, V, T>(&mut self, values: B, ttl: T) -> Result<bool>
    where
        B: BatchInput<Item = (K, V)>,
        K: AsCacheKey,
        V: Into<Value>,
        T: Into<Ttl>,
    {
        multi::set_each(values, ttl.into(), |key, value, ttl| {
            self.set(key, value, ttl)
        })
    }

    /// Removes every listed key.
    fn delete_multiple<B>(&mut self, keys: B) -> Result<bool>
    where
        B: BatchInput,
        B::Item: AsCacheKey,
    {
        multi::delete_each(keys, |key| self.delete(key))
    }
}
