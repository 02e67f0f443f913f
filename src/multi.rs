//! Multiple-Key Adapter
//!
//! Batch get/set/delete built from a backend's single-key operations, for
//! backends without native batching. The single-key operation is passed in
//! as a closure, so any backend can reuse these.
//!
//! Batches are not atomic: entries applied before a failure stay applied, and
//! the caller only learns whether every key succeeded.

use std::collections::HashMap;

use serde_json::Value;
use tracing::trace;

use crate::error::Result;
use crate::key::{validate_batch, AsCacheKey, BatchInput};
use crate::ttl::Ttl;

/// Collects `get(key, default)` for every requested key.
///
/// Only the container is checked here; a malformed element fails inside `get`.
pub fn get_each<B, F>(keys: B, default: Value, mut get: F) -> Result<HashMap<String, Value>>
where
    B: BatchInput,
    B::Item: AsCacheKey,
    F: FnMut(&dyn AsCacheKey, Value) -> Result<Value>,
{
    let mut results = HashMap::new();

    for key in validate_batch(keys, "keys")? {
        let value = get(&key, default.clone())?;
        if let Some(key) = key.as_cache_key() {
            results.insert(key.to_owned(), value);
        }
    }

    Ok(results)
}

/// Applies `set(key, value, ttl)` to every pair; true only if all succeeded.
pub fn set_each<B, K, V, F>(values: B, ttl: Ttl, mut set: F) -> Result<bool>
where
    B: BatchInput<Item = (K, V)>,
    K: AsCacheKey,
    V: Into<Value>,
    F: FnMut(&dyn AsCacheKey, Value, Ttl) -> Result<bool>,
{
    let mut all_stored = true;

    for (key, value) in validate_batch(values, "values")? {
        if !set(&key, value.into(), ttl)? {
            trace!(key = key.as_cache_key(), "batch set failed for key");
            all_stored = false;
        }
    }

    Ok(all_stored)
}

/// Applies `delete(key)` to every key; true only if all succeeded.
pub fn delete_each<B, F>(keys: B, mut delete: F) -> Result<bool>
where
    B: BatchInput,
    B::Item: AsCacheKey,
    F: FnMut(&dyn AsCacheKey) -> Result<bool>,
{
    let mut all_deleted = true;

    for key in validate_batch(keys, "keys")? {
        if !delete(&key)? {
            trace!(key = key.as_cache_key(), "batch delete failed for key");
            all_deleted = false;
        }
    }

    Ok(all_deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::key::lazy;
    use serde_json::json;

    #[test]
    fn test_get_each_fills_default() {
        let stored: HashMap<&str, Value> = HashMap::from([("a", json!(1))]);

        let result = get_each(vec!["a", "b"], json!("tea"), |key, default| {
            let key = key.as_cache_key().unwrap();
            Ok(stored.get(key).cloned().unwrap_or(default))
        })
        .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result["a"], json!(1));
        assert_eq!(result["b"], json!("tea"));
    }

    #[test]
    fn test_get_each_propagates_element_error() {
        let result = get_each(vec![Some("a"), None], Value::Null, |key, default| {
            crate::key::validate(key)?;
            Ok(default)
        });
        assert!(matches!(result, Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn test_set_each_reports_any_failure() {
        let mut seen = Vec::new();
        let ok = set_each(
            vec![("a", "1"), ("b", "2"), ("c", "3")],
            Ttl::Absent,
            |key, _value, _ttl| {
                let key = key.as_cache_key().unwrap().to_owned();
                let stored = key != "b";
                seen.push(key);
                Ok(stored)
            },
        )
        .unwrap();

        assert!(!ok);
        // no short-circuit: later keys are still applied
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_delete_each_with_lazy_keys() {
        let mut deleted = Vec::new();
        let ok = delete_each(lazy(["a", "c"]), |key| {
            deleted.push(key.as_cache_key().unwrap().to_owned());
            Ok(true)
        })
        .unwrap();

        assert!(ok);
        assert_eq!(deleted, vec!["a", "c"]);
    }

    #[test]
    fn test_missing_container_is_invalid() {
        let err = delete_each(None::<Vec<&str>>, |_| Ok(true)).unwrap_err();
        assert_eq!(err, CacheError::invalid_key("keys must be iterable"));

        let err = set_each(None::<Vec<(&str, Value)>>, Ttl::Absent, |_, _, _| Ok(true))
            .unwrap_err();
        assert_eq!(err, CacheError::invalid_key("values must be iterable"));
    }
}
