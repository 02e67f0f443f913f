//! Unicache - one cache contract, interchangeable backends
//!
//! Application code depends on [`CacheBackend`] only and can swap between a
//! process-local map, a host-local shared segment and a networked daemon.
//!
//! ```rust
//! use serde_json::{json, Value};
//! use unicache::{CacheBackend, InMemoryBackend, Ttl};
//!
//! let mut cache = InMemoryBackend::new();
//! cache.set("foo", "bar", Ttl::Seconds(60)).unwrap();
//! assert_eq!(cache.get("foo", Value::Null).unwrap(), json!("bar"));
//!
//! cache.set_multiple(vec![("key1", "value1"), ("key2", "value2")], Ttl::Absent).unwrap();
//! cache.delete_multiple(["key1"]).unwrap();
//! let values = cache.get_multiple(["key1", "key2"], json!("tea")).unwrap();
//! assert_eq!(values["key1"], json!("tea"));
//! assert_eq!(values["key2"], json!("value2"));
//! ```

pub mod backend;
pub mod config;
pub mod distributed;
pub mod error;
pub mod key;
pub mod memory;
pub mod multi;
pub mod segment;
pub mod testing;
pub mod ttl;

pub use backend::CacheBackend;
pub use config::BackendConfig;
pub use distributed::{DaemonClient, DistributedBackend, ResultCode};
pub use error::{CacheError, Result};
pub use key::{lazy, AsCacheKey, BatchInput, Lazy};
pub use memory::InMemoryBackend;
pub use segment::{SegmentClient, SharedSegmentBackend};
pub use ttl::{Interval, Ttl};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
