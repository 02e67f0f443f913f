//! Memory Module
//!
//! Process-local backend with lazily evicted per-entry expiry.

mod entry;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use store::InMemoryBackend;
