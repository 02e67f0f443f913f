//! Distributed Backend
//!
//! Talks to a networked caching daemon through a pre-connected client. The
//! daemon answers every call with a result code, and that code, never the
//! returned value, decides between hit, miss and malformed key: a stored
//! `false` or `""` is a hit like any other value.

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use serde_json::Value;
use tracing::{trace, warn};

use crate::backend::CacheBackend;
use crate::config::BackendConfig;
use crate::error::{CacheError, Result};
use crate::key::{validate, validate_batch, AsCacheKey, BatchInput};
use crate::ttl::Ttl;

// == Result Code ==
/// Outcome of a daemon operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    NotFound,
    NotStored,
    /// The daemon rejected the key (too long, whitespace, control characters)
    BadKeyProvided,
    ConnectionFailure,
    Timeout,
    ServerError,
}

impl ResultCode {
    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }

    /// Success or NotFound: the key is not stored afterwards.
    fn is_removed(self) -> bool {
        matches!(self, ResultCode::Success | ResultCode::NotFound)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultCode::Success => "SUCCESS",
            ResultCode::NotFound => "NOT FOUND",
            ResultCode::NotStored => "NOT STORED",
            ResultCode::BadKeyProvided => "BAD KEY PROVIDED",
            ResultCode::ConnectionFailure => "CONNECTION FAILURE",
            ResultCode::Timeout => "TIMEOUT",
            ResultCode::ServerError => "SERVER ERROR",
        };
        f.write_str(name)
    }
}

// == Daemon Client ==
/// A connected daemon client, owned by the host application.
///
/// `expiry` arguments use the native dual encoding produced by
/// [`Ttl::native_expiry`].
pub trait DaemonClient {
    /// Returns the value together with the result code.
    ///
    /// On any code other than `Success` the value is a placeholder.
    fn get(&mut self, key: &str) -> (Value, ResultCode);

    fn set(&mut self, key: &str, value: &Value, expiry: i64) -> ResultCode;

    fn delete(&mut self, key: &str) -> ResultCode;

    /// Invalidates every item on the daemon.
    fn flush(&mut self) -> ResultCode;

    /// Returns only the keys that were found.
    fn get_multi(&mut self, keys: &[String]) -> (HashMap<String, Value>, ResultCode);

    fn set_multi(&mut self, entries: &[(String, Value)], expiry: i64) -> ResultCode;

    /// Returns one result code per requested key.
    fn delete_multi(&mut self, keys: &[String]) -> Vec<(String, ResultCode)>;
}

impl<C: DaemonClient + ?Sized> DaemonClient for &mut C {
    fn get(&mut self, key: &str) -> (Value, ResultCode) {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &Value, expiry: i64) -> ResultCode {
        (**self).set(key, value, expiry)
    }

    fn delete(&mut self, key: &str) -> ResultCode {
        (**self).delete(key)
    }

    fn flush(&mut self) -> ResultCode {
        (**self).flush()
    }

    fn get_multi(&mut self, keys: &[String]) -> (HashMap<String, Value>, ResultCode) {
        (**self).get_multi(keys)
    }

    fn set_multi(&mut self, entries: &[(String, Value)], expiry: i64) -> ResultCode {
        (**self).set_multi(entries, expiry)
    }

    fn delete_multi(&mut self, keys: &[String]) -> Vec<(String, ResultCode)> {
        (**self).delete_multi(keys)
    }
}

fn bad_key(key: &str) -> CacheError {
    CacheError::invalid_key(format!("key was not valid: {:?}", key))
}

fn bad_batch() -> CacheError {
    CacheError::invalid_key("batch contained a key the daemon rejected")
}

// == Distributed Backend ==
/// Cache backed by a networked daemon.
///
/// An unreachable daemon looks like a miss to `get` and like a failure to the
/// mutating operations; callers cannot tell "miss" from "down" through `get`.
#[derive(Debug)]
pub struct DistributedBackend<C> {
    client: C,
    config: BackendConfig,
}

impl<C: DaemonClient> DistributedBackend<C> {
    // == Constructor ==
    pub fn new(client: C) -> Self {
        Self::with_config(client, BackendConfig::default())
    }

    pub fn with_config(client: C, config: BackendConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn into_inner(self) -> C {
        self.client
    }

    fn native_expiry(&self, ttl: Ttl) -> i64 {
        self.config.effective_ttl(ttl).native_expiry(Utc::now())
    }

    fn owned_keys<B>(keys: B) -> Result<Vec<String>>
    where
        B: BatchInput,
        B::Item: AsCacheKey,
    {
        validate_batch(keys, "keys")?
            .map(|key| validate(&key).map(str::to_owned))
            .collect()
    }
}

impl<C: DaemonClient> CacheBackend for DistributedBackend<C> {
    fn get<K: AsCacheKey>(&mut self, key: K, default: Value) -> Result<Value> {
        let key = validate(&key)?;

        match self.client.get(key) {
            (value, ResultCode::Success) => Ok(value),
            (_, ResultCode::NotFound) => {
                trace!(key, "cache miss");
                Ok(default)
            }
            (_, ResultCode::BadKeyProvided) => Err(bad_key(key)),
            (_, code) => {
                warn!(key, %code, "daemon get failed, returning default");
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
        let expiry = self.native_expiry(ttl.into());

        match self.client.set(key, &value.into(), expiry) {
            ResultCode::Success => Ok(true),
            ResultCode::BadKeyProvided => Err(bad_key(key)),
            code => {
                warn!(key, %code, "daemon set failed");
                Ok(false)
            }
        }
    }

    fn delete<K: AsCacheKey>(&mut self, key: K) -> Result<bool> {
        let key = validate(&key)?;

        match self.client.delete(key) {
            ResultCode::BadKeyProvided => Err(bad_key(key)),
            code if code.is_removed() => Ok(true),
            code => {
                warn!(key, %code, "daemon delete failed");
                Ok(false)
            }
        }
    }

    fn clear(&mut self) -> bool {
        let code = self.client.flush();
        if !code.is_success() {
            warn!(%code, "daemon flush failed");
        }
        code.is_success()
    }

    /// Issues a `get` and inspects its result code; there is no separate
    /// existence call on the daemon.
    fn has<K: AsCacheKey>(&mut self, key: K) -> Result<bool> {
        let key = validate(&key)?;

        match self.client.get(key).1 {
            ResultCode::Success => Ok(true),
            ResultCode::BadKeyProvided => Err(bad_key(key)),
            _ => Ok(false),
        }
    }

    fn get_multiple<B>(&mut self, keys: B, default: Value) -> Result<HashMap<String, Value>>
    where
        B: BatchInput,
        B::Item: AsCacheKey,
    {
        let keys = Self::owned_keys(keys)?;

        let found = match self.client.get_multi(&keys) {
            (found, ResultCode::Success | ResultCode::NotFound) => found,
            (_, ResultCode::BadKeyProvided) => return Err(bad_batch()),
            (_, code) => {
                warn!(%code, "daemon multi-get failed, returning defaults");
                HashMap::new()
            }
        };

        Ok(keys
            .into_iter()
            .map(|key| {
                let value = found.get(&key).cloned().unwrap_or_else(|| default.clone());
                (key, value)
            })
            .collect())
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
        let expiry = self.native_expiry(ttl.into());

        match self.client.set_multi(&entries, expiry) {
            ResultCode::Success => Ok(true),
            ResultCode::BadKeyProvided => Err(bad_batch()),
            code => {
                warn!(%code, "daemon multi-set failed");
                Ok(false)
            }
        }
    }

    fn delete_multiple<B>(&mut self, keys: B) -> Result<bool>
    where
        B: BatchInput,
        B::Item: AsCacheKey,
    {
        let keys = Self::owned_keys(keys)?;
        let results = self.client.delete_multi(&keys);

        if results
            .iter()
            .any(|(_, code)| *code == ResultCode::BadKeyProvided)
        {
            return Err(bad_batch());
        }

        let failed = results.iter().filter(|(_, code)| !code.is_removed()).count();
        if failed > 0 {
            warn!(failed, "daemon multi-delete failed for some keys");
        }
        Ok(failed == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDaemon;
    use serde_json::json;

    #[test]
    fn test_falsy_values_are_hits() {
        let mut backend = DistributedBackend::new(MockDaemon::new());

        backend.set("f", false, Ttl::Absent).unwrap();
        backend.set("e", "", Ttl::Absent).unwrap();
        backend.set("z", 0, Ttl::Absent).unwrap();

        assert_eq!(backend.get("f", json!("default")).unwrap(), json!(false));
        assert_eq!(backend.get("e", json!("default")).unwrap(), json!(""));
        assert_eq!(backend.get("z", json!("default")).unwrap(), json!(0));
        assert!(backend.has("f").unwrap());
    }

    #[test]
    fn test_miss_returns_default() {
        let mut backend = DistributedBackend::new(MockDaemon::new());

        assert_eq!(backend.get("nope", json!("tea")).unwrap(), json!("tea"));
        assert!(!backend.has("nope").unwrap());
    }

    #[test]
    fn test_rejected_key_is_invalid_key() {
        let mut backend = DistributedBackend::new(MockDaemon::new());

        for result in [
            backend.get("contains white space", Value::Null).map(|_| ()),
            backend.set("contains white space", 1, Ttl::Absent).map(|_| ()),
            backend.delete("contains white space").map(|_| ()),
            backend.has("contains white space").map(|_| ()),
            backend.get_multiple(vec!["ok", "not ok"], Value::Null).map(|_| ()),
        ] {
            assert!(matches!(result, Err(CacheError::InvalidKey(_))));
        }
    }

    #[test]
    fn test_unreachable_daemon_degrades_to_default_and_false() {
        let daemon = MockDaemon::new();
        let mut backend = DistributedBackend::new(daemon.clone());
        backend.set("foo", "bar", Ttl::Absent).unwrap();

        daemon.set_offline(true);

        assert_eq!(backend.get("foo", json!("fallback")).unwrap(), json!("fallback"));
        assert!(!backend.has("foo").unwrap());
        assert!(!backend.set("foo", "baz", Ttl::Absent).unwrap());
        assert!(!backend.delete("foo").unwrap());
        assert!(!backend.clear());
        assert!(!backend.set_multiple(vec![("a", 1)], Ttl::Absent).unwrap());
        assert!(!backend.delete_multiple(vec!["a"]).unwrap());
        assert_eq!(
            backend.get_multiple(vec!["foo"], json!("fallback")).unwrap()["foo"],
            json!("fallback")
        );

        daemon.set_offline(false);
        assert_eq!(backend.get("foo", Value::Null).unwrap(), json!("bar"));
    }

    #[test]
    fn test_get_multiple_fills_default_once_per_key() {
        let mut backend = DistributedBackend::new(MockDaemon::new());
        backend.set("key2", "value2", Ttl::Absent).unwrap();

        let result = backend
            .get_multiple(vec!["key1", "key2", "key2"], json!("tea"))
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result["key1"], json!("tea"));
        assert_eq!(result["key2"], json!("value2"));
    }

    #[test]
    fn test_delete_absent_key_succeeds() {
        let mut backend = DistributedBackend::new(MockDaemon::new());

        assert!(backend.delete("never-set").unwrap());
        assert!(backend.delete_multiple(vec!["a", "b"]).unwrap());
    }

    #[test]
    fn test_expiry_uses_native_encoding() {
        let daemon = MockDaemon::new();
        let mut backend = DistributedBackend::new(daemon.clone());

        backend.set("short", 1, Ttl::Seconds(60)).unwrap();
        backend.set("forever", 1, Ttl::Absent).unwrap();
        backend
            .set_multiple(vec![("month", 1)], "P2M".parse::<crate::ttl::Interval>().unwrap())
            .unwrap();

        assert_eq!(daemon.last_expiry("short"), Some(60));
        assert_eq!(daemon.last_expiry("forever"), Some(0));
        assert!(daemon.last_expiry("month").unwrap() > Utc::now().timestamp());
    }

    #[test]
    fn test_short_and_zero_ttls_never_mean_forever() {
        let daemon = MockDaemon::new();
        let mut backend = DistributedBackend::new(daemon.clone());

        backend
            .set("brief", 1, std::time::Duration::from_millis(400))
            .unwrap();
        backend.set("now", 1, Ttl::Seconds(0)).unwrap();

        assert_eq!(daemon.last_expiry("brief"), Some(1));
        assert_eq!(daemon.last_expiry("now"), Some(crate::ttl::NATIVE_EXPIRED));
        assert!(!backend.has("now").unwrap());
    }

    #[test]
    fn test_borrowed_client() {
        let mut daemon = MockDaemon::new();
        {
            let mut backend = DistributedBackend::new(&mut daemon);
            backend.set("foo", "bar", Ttl::Absent).unwrap();
        }
        assert_eq!(daemon.get("foo"), (json!("bar"), ResultCode::Success));
    }
}
