//! In-Memory Backend
//!
//! Process-local map with per-entry expiry instants. Expiry is lazy: an
//! expired entry stays in the map until the next `get` or `has` touches it,
//! so those reads may mutate the map.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, trace};

use crate::backend::CacheBackend;
use crate::config::BackendConfig;
use crate::error::Result;
use crate::key::{validate, AsCacheKey};
use crate::memory::CacheEntry;
use crate::ttl::Ttl;

// == In-Memory Backend ==
/// Cache backed by a `HashMap` owned by this instance.
///
/// Not thread-safe on its own: every operation takes `&mut self`. Hosts that
/// share one instance across threads must guard it with a `Mutex`, e.g.
/// `Arc<Mutex<InMemoryBackend>>`.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Backend settings
    config: BackendConfig,
}

impl InMemoryBackend {
    // == Constructor ==
    /// Creates an empty backend whose entries never expire unless a TTL is given.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty backend with the given settings.
    ///
    /// # Arguments
    /// * `config` - Backend settings; `default_ttl` applies to sets without a TTL
    pub fn with_config(config: BackendConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
        }
    }

    // == Live Entry ==
    /// Returns the live entry for `key`, evicting it first if it has expired.
    fn live_entry(&mut self, key: &str) -> Option<&CacheEntry> {
        let expired = self.entries.get(key)?.is_expired_at(Utc::now());
        if expired {
            self.entries.remove(key);
            debug!(key, "evicted expired entry on access");
            return None;
        }
        self.entries.get(key)
    }

    // == Purge Expired ==
    /// Removes all expired entries now instead of waiting for access.
    ///
    /// # Returns
    /// The number of entries removed
    pub fn purge_expired(&mut self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));

        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "purged expired entries");
        }
        removed
    }

    // == Length ==
    /// Returns the number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheBackend for InMemoryBackend {
    fn get<K: AsCacheKey>(&mut self, key: K, default: Value) -> Result<Value> {
        let key = validate(&key)?;

        match self.live_entry(key) {
            Some(entry) => {
                trace!(key, "cache hit");
                Ok(entry.value.clone())
            }
            None => {
                trace!(key, "cache miss");
                Ok(default)
            }
        }
    }

    fn set<K, V, T>(&mut self, key: K, value: V, ttl: T) -> Result<bool>
    where
        K: AsCacheKey,
        V: Into<Value>,
        T: Into<Ttl>,
    {
        let key = validate(&key)?;
        let expires_at = self.config.effective_ttl(ttl.into()).expires_at(Utc::now());

        let entry = CacheEntry::new(value.into(), expires_at);
        trace!(key, ttl_remaining = ?entry.ttl_remaining(), "cache set");
        self.entries.insert(key.to_owned(), entry);
        Ok(true)
    }

    fn delete<K: AsCacheKey>(&mut self, key: K) -> Result<bool> {
        let key = validate(&key)?;
        self.entries.remove(key);
        Ok(true)
    }

    fn clear(&mut self) -> bool {
        self.entries.clear();
        true
    }

    fn has<K: AsCacheKey>(&mut self, key: K) -> Result<bool> {
        let key = validate(&key)?;
        Ok(self.live_entry(key).is_some())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::ttl::Interval;
    use chrono::TimeDelta;
    use serde_json::json;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_store_new() {
        let store = InMemoryBackend::new();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = InMemoryBackend::new();

        assert!(store.set("key1", "value1", Ttl::Absent).unwrap());
        let value = store.get("key1", Value::Null).unwrap();

        assert_eq!(value, json!("value1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent_returns_default() {
        let mut store = InMemoryBackend::new();

        assert_eq!(store.get("nonexistent", Value::Null).unwrap(), Value::Null);
        assert_eq!(
            store.get("nonexistent", json!("chickpeas")).unwrap(),
            json!("chickpeas")
        );
    }

    #[test]
    fn test_store_keeps_falsy_values() {
        let mut store = InMemoryBackend::new();

        store.set("f", false, Ttl::Absent).unwrap();
        store.set("e", "", Ttl::Absent).unwrap();

        assert_eq!(store.get("f", json!("default")).unwrap(), json!(false));
        assert_eq!(store.get("e", json!("default")).unwrap(), json!(""));
        assert!(store.has("f").unwrap());
    }

    #[test]
    fn test_store_delete_is_idempotent() {
        let mut store = InMemoryBackend::new();

        store.set("key1", "value1", Ttl::Absent).unwrap();
        assert!(store.delete("key1").unwrap());
        assert!(store.delete("key1").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_overwrite() {
        let mut store = InMemoryBackend::new();

        store.set("key1", "value1", Ttl::Absent).unwrap();
        store.set("key1", "value2", Ttl::Absent).unwrap();

        assert_eq!(store.get("key1", Value::Null).unwrap(), json!("value2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_expired_entry_is_evicted_on_get() {
        let mut store = InMemoryBackend::new();

        store.set("key1", "value1", TimeDelta::seconds(-1)).unwrap();
        // still physically present until touched
        assert_eq!(store.len(), 1);

        assert_eq!(store.get("key1", json!("gone")).unwrap(), json!("gone"));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_expired_entry_is_evicted_on_has() {
        let mut store = InMemoryBackend::new();

        store.set("key1", "value1", Ttl::Seconds(0)).unwrap();
        assert!(!store.has("key1").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_ttl_expiration() {
        let mut store = InMemoryBackend::new();

        store.set("key1", "value1", Ttl::Seconds(1)).unwrap();
        assert_eq!(store.get("key1", Value::Null).unwrap(), json!("value1"));

        sleep(Duration::from_millis(1100));

        assert_eq!(store.get("key1", Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_store_interval_expiration() {
        let mut store = InMemoryBackend::new();
        let interval: Interval = "PT1S".parse().unwrap();

        store.set("key1", "value1", interval).unwrap();
        assert!(store.has("key1").unwrap());

        sleep(Duration::from_millis(1100));

        assert!(!store.has("key1").unwrap());
    }

    #[test]
    fn test_store_purge_expired() {
        let mut store = InMemoryBackend::new();

        store.set("key1", "value1", TimeDelta::seconds(-1)).unwrap();
        store.set("key2", "value2", Ttl::Seconds(10)).unwrap();
        store.set("key3", "value3", Ttl::Absent).unwrap();

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 2);
        assert!(store.has("key2").unwrap());
    }

    #[test]
    fn test_store_default_ttl_from_config() {
        let mut store = InMemoryBackend::with_config(BackendConfig::with_default_ttl(60));

        store.set("key1", "value1", Ttl::Absent).unwrap();
        let entry = store.entries.get("key1").unwrap();
        assert!(entry.expires_at.is_some());
    }

    #[test]
    fn test_store_clear() {
        let mut store = InMemoryBackend::new();

        store.set("key1", "value1", Ttl::Absent).unwrap();
        store.set("key2", "value2", Ttl::Seconds(60)).unwrap();
        assert!(store.clear());

        assert!(store.is_empty());
        assert!(!store.has("key1").unwrap());
    }

    #[test]
    fn test_store_invalid_key_has_no_side_effects() {
        let mut store = InMemoryBackend::new();

        let err = store.set(None::<&str>, "bar", Ttl::Absent).unwrap_err();
        assert!(matches!(err, CacheError::InvalidKey(_)));
        assert!(store.is_empty());

        assert!(store.get(json!(1), Value::Null).is_err());
        assert!(store.delete(None::<&str>).is_err());
        assert!(store.has(None::<String>).is_err());
    }
}
