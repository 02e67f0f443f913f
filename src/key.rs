//! Key Validation Module
//!
//! Every public operation funnels its key (or batch container) through here
//! before touching storage. Keys must be strings; the empty string is legal.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::error::{CacheError, Result};

// == Cache Key ==
/// Anything a caller may hand in as a cache key.
///
/// Returns `None` when the value is not string-shaped, e.g. `None` or a
/// non-string JSON value decoded from a request.
pub trait AsCacheKey {
    fn as_cache_key(&self) -> Option<&str>;
}

impl AsCacheKey for str {
    fn as_cache_key(&self) -> Option<&str> {
        Some(self)
    }
}

impl AsCacheKey for String {
    fn as_cache_key(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

impl<K: AsCacheKey + ?Sized> AsCacheKey for &K {
    fn as_cache_key(&self) -> Option<&str> {
        (**self).as_cache_key()
    }
}

impl<K: AsCacheKey> AsCacheKey for Option<K> {
    fn as_cache_key(&self) -> Option<&str> {
        self.as_ref().and_then(|key| key.as_cache_key())
    }
}

impl AsCacheKey for Value {
    fn as_cache_key(&self) -> Option<&str> {
        match self {
            Value::String(key) => Some(key.as_str()),
            _ => None,
        }
    }
}

/// Returns the key as a string slice or fails with `InvalidKey`.
pub fn validate<K: AsCacheKey + ?Sized>(key: &K) -> Result<&str> {
    key.as_cache_key()
        .ok_or_else(|| CacheError::invalid_key("key must be a string"))
}

// == Batch Input ==
/// A container of keys or key/value pairs for the multiple-key operations.
///
/// `into_batch` yields `None` when the container is not iterable at all,
/// which the batch operations report as `InvalidKey`.
pub trait BatchInput {
    type Item;
    type Iter: Iterator<Item = Self::Item>;

    fn into_batch(self) -> Option<Self::Iter>;
}

impl<T> BatchInput for Vec<T> {
    type Item = T;
    type Iter = std::vec::IntoIter<T>;

    fn into_batch(self) -> Option<Self::Iter> {
        Some(self.into_iter())
    }
}

impl<T, const N: usize> BatchInput for [T; N] {
    type Item = T;
    type Iter = std::array::IntoIter<T, N>;

    fn into_batch(self) -> Option<Self::Iter> {
        Some(self.into_iter())
    }
}

impl<'a, T> BatchInput for &'a [T] {
    type Item = &'a T;
    type Iter = std::slice::Iter<'a, T>;

    fn into_batch(self) -> Option<Self::Iter> {
        Some(self.iter())
    }
}

impl<'a, T> BatchInput for &'a Vec<T> {
    type Item = &'a T;
    type Iter = std::slice::Iter<'a, T>;

    fn into_batch(self) -> Option<Self::Iter> {
        Some(self.iter())
    }
}

impl<K, V, S> BatchInput for HashMap<K, V, S> {
    type Item = (K, V);
    type Iter = std::collections::hash_map::IntoIter<K, V>;

    fn into_batch(self) -> Option<Self::Iter> {
        Some(self.into_iter())
    }
}

impl<K, V> BatchInput for BTreeMap<K, V> {
    type Item = (K, V);
    type Iter = std::collections::btree_map::IntoIter<K, V>;

    fn into_batch(self) -> Option<Self::Iter> {
        Some(self.into_iter())
    }
}

impl<B: BatchInput> BatchInput for Option<B> {
    type Item = B::Item;
    type Iter = B::Iter;

    fn into_batch(self) -> Option<Self::Iter> {
        self.and_then(BatchInput::into_batch)
    }
}

/// Wraps a lazily evaluated iterator so it can be passed as a batch.
#[derive(Debug, Clone)]
pub struct Lazy<I>(pub I);

impl<I: Iterator> BatchInput for Lazy<I> {
    type Item = I::Item;
    type Iter = I;

    fn into_batch(self) -> Option<Self::Iter> {
        Some(self.0)
    }
}

/// Builds a `Lazy` batch from anything iterable.
pub fn lazy<I: IntoIterator>(iter: I) -> Lazy<I::IntoIter> {
    Lazy(iter.into_iter())
}

/// Opens a batch container or fails with `InvalidKey` naming the argument.
pub fn validate_batch<B: BatchInput>(batch: B, what: &str) -> Result<B::Iter> {
    batch
        .into_batch()
        .ok_or_else(|| CacheError::invalid_key(format!("{} must be iterable", what)))
}
