//! Testing support
//!
//! In-process stand-ins for the handles the segment and distributed backends
//! consume, so code written against [`CacheBackend`](crate::CacheBackend) can
//! be exercised without a shared-memory segment or a running daemon.
//!
//! Both mocks are cheap to clone and every clone sees the same storage, the
//! way several processes attach to one segment or one daemon.
//!
//! ```rust
//! use serde_json::{json, Value};
//! use unicache::testing::MockDaemon;
//! use unicache::{CacheBackend, DistributedBackend, Ttl};
//!
//! let mut cache = DistributedBackend::new(MockDaemon::new());
//! cache.set("foo", false, Ttl::Absent).unwrap();
//! assert_eq!(cache.get("foo", json!("default")).unwrap(), json!(false));
//! assert_eq!(cache.get("bar", Value::Null).unwrap(), Value::Null);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use crate::distributed::{DaemonClient, ResultCode};
use crate::memory::CacheEntry;
use crate::segment::SegmentClient;
use crate::ttl::{NATIVE_NO_EXPIRY, NATIVE_RELATIVE_LIMIT};

/// Longest key the mock daemon accepts, in bytes.
pub const MAX_DAEMON_KEY_LENGTH: usize = 250;

/// Decodes the native dual relative/absolute expiry into an instant.
fn decode_expiry(expiry: i64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match expiry {
        NATIVE_NO_EXPIRY => None,
        e if e < 0 => Some(now),
        e if e <= NATIVE_RELATIVE_LIMIT => Some(now + TimeDelta::seconds(e)),
        e => Some(DateTime::<Utc>::from_timestamp(e, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)),
    }
}

/// Removes the entry if it has expired and returns the live one, if any.
fn live<'a>(entries: &'a mut HashMap<String, CacheEntry>, key: &str) -> Option<&'a CacheEntry> {
    if entries.get(key)?.is_expired() {
        entries.remove(key);
        return None;
    }
    entries.get(key)
}

// == Mock Segment ==
#[derive(Debug, Default)]
struct SegmentState {
    entries: HashMap<String, CacheEntry>,
    refused: HashSet<String>,
    last_ttl: HashMap<String, i64>,
    batch_calls: usize,
}

impl SegmentState {
    fn store(&mut self, key: &str, value: &Value, ttl: i64) -> bool {
        if self.refused.contains(key) {
            return false;
        }
        let entry = CacheEntry::new(value.clone(), decode_expiry(ttl, Utc::now()));
        self.entries.insert(key.to_owned(), entry);
        self.last_ttl.insert(key.to_owned(), ttl);
        true
    }
}

/// Shared-memory segment stand-in with optional native batch calls.
#[derive(Debug, Clone)]
pub struct MockSegment {
    state: Arc<Mutex<SegmentState>>,
    native_batch: bool,
}

impl Default for MockSegment {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSegment {
    /// A segment with native batch store/delete.
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            native_batch: true,
        }
    }

    /// A segment without batch primitives.
    pub fn without_batch() -> Self {
        Self {
            native_batch: false,
            ..Self::new()
        }
    }

    /// Makes every later store of `key` fail.
    pub fn refuse_key(&self, key: &str) {
        self.state().refused.insert(key.to_owned());
    }

    /// The native TTL passed with the last successful store of `key`.
    pub fn last_ttl(&self, key: &str) -> Option<i64> {
        self.state().last_ttl.get(key).copied()
    }

    /// Number of native batch calls served.
    pub fn batch_calls(&self) -> usize {
        self.state().batch_calls
    }

    fn state(&self) -> MutexGuard<'_, SegmentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SegmentClient for MockSegment {
    fn fetch(&self, key: &str) -> Option<Value> {
        live(&mut self.state().entries, key).map(|entry| entry.value.clone())
    }

    fn store(&self, key: &str, value: &Value, ttl: i64) -> bool {
        self.state().store(key, value, ttl)
    }

    fn delete(&self, key: &str) -> bool {
        self.state().entries.remove(key).is_some()
    }

    fn exists(&self, key: &str) -> bool {
        live(&mut self.state().entries, key).is_some()
    }

    fn clear(&self) -> bool {
        self.state().entries.clear();
        true
    }

    fn store_many(&self, entries: &[(String, Value)], ttl: i64) -> Option<Vec<String>> {
        if !self.native_batch {
            return None;
        }
        let mut state = self.state();
        state.batch_calls += 1;

        let failed = entries
            .iter()
            .filter(|(key, value)| !state.store(key, value, ttl))
            .map(|(key, _)| key.clone())
            .collect();
        Some(failed)
    }

    fn delete_many(&self, keys: &[String]) -> Option<Vec<String>> {
        if !self.native_batch {
            return None;
        }
        let mut state = self.state();
        state.batch_calls += 1;

        let failed = keys
            .iter()
            .filter(|key| state.entries.remove(key.as_str()).is_none())
            .cloned()
            .collect();
        Some(failed)
    }
}

// == Mock Daemon ==
#[derive(Debug, Default)]
struct DaemonState {
    entries: HashMap<String, CacheEntry>,
    last_expiry: HashMap<String, i64>,
    offline: bool,
}

impl DaemonState {
    fn check(&self, key: &str) -> ResultCode {
        if self.offline {
            ResultCode::ConnectionFailure
        } else if !is_daemon_key(key) {
            ResultCode::BadKeyProvided
        } else {
            ResultCode::Success
        }
    }

    fn delete(&mut self, key: &str) -> ResultCode {
        match self.check(key) {
            ResultCode::Success => match self.entries.remove(key) {
                Some(entry) if !entry.is_expired() => ResultCode::Success,
                _ => ResultCode::NotFound,
            },
            code => code,
        }
    }
}

/// Whether the daemon accepts `key`: non-empty, at most
/// `MAX_DAEMON_KEY_LENGTH` bytes, no whitespace or control characters.
pub fn is_daemon_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_DAEMON_KEY_LENGTH
        && !key.chars().any(|c| c.is_whitespace() || c.is_control())
}

/// Networked daemon stand-in with daemon-style key rules and result codes.
#[derive(Debug, Clone, Default)]
pub struct MockDaemon {
    state: Arc<Mutex<DaemonState>>,
}

impl MockDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates losing (or regaining) the connection.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// The native expiry passed with the last successful set of `key`.
    pub fn last_expiry(&self, key: &str) -> Option<i64> {
        self.state().last_expiry.get(key).copied()
    }

    fn state(&self) -> MutexGuard<'_, DaemonState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DaemonClient for MockDaemon {
    fn get(&mut self, key: &str) -> (Value, ResultCode) {
        let mut state = self.state();
        match state.check(key) {
            ResultCode::Success => match live(&mut state.entries, key) {
                Some(entry) => (entry.value.clone(), ResultCode::Success),
                None => (Value::Bool(false), ResultCode::NotFound),
            },
            code => (Value::Bool(false), code),
        }
    }

    fn set(&mut self, key: &str, value: &Value, expiry: i64) -> ResultCode {
        let mut state = self.state();
        let code = state.check(key);
        if code.is_success() {
            let entry = CacheEntry::new(value.clone(), decode_expiry(expiry, Utc::now()));
            state.entries.insert(key.to_owned(), entry);
            state.last_expiry.insert(key.to_owned(), expiry);
        }
        code
    }

    fn delete(&mut self, key: &str) -> ResultCode {
        self.state().delete(key)
    }

    fn flush(&mut self) -> ResultCode {
        let mut state = self.state();
        if state.offline {
            return ResultCode::ConnectionFailure;
        }
        state.entries.clear();
        ResultCode::Success
    }

    fn get_multi(&mut self, keys: &[String]) -> (HashMap<String, Value>, ResultCode) {
        let mut state = self.state();
        if let Some(code) = keys
            .iter()
            .map(|key| state.check(key))
            .find(|code| !code.is_success())
        {
            return (HashMap::new(), code);
        }

        let found: HashMap<String, Value> = keys
            .iter()
            .filter_map(|key| {
                live(&mut state.entries, key).map(|entry| (key.clone(), entry.value.clone()))
            })
            .collect();
        let code = if found.is_empty() {
            ResultCode::NotFound
        } else {
            ResultCode::Success
        };
        (found, code)
    }

    fn set_multi(&mut self, entries: &[(String, Value)], expiry: i64) -> ResultCode {
        let mut state = self.state();
        if let Some(code) = entries
            .iter()
            .map(|(key, _)| state.check(key))
            .find(|code| !code.is_success())
        {
            return code;
        }

        let expires_at = decode_expiry(expiry, Utc::now());
        for (key, value) in entries {
            state
                .entries
                .insert(key.clone(), CacheEntry::new(value.clone(), expires_at));
            state.last_expiry.insert(key.clone(), expiry);
        }
        ResultCode::Success
    }

    fn delete_multi(&mut self, keys: &[String]) -> Vec<(String, ResultCode)> {
        let mut state = self.state();
        keys.iter()
            .map(|key| (key.clone(), state.delete(key)))
            .collect()
    }
}
