//! Cache Module
//!
//! In-memory loading cache with single-flight loads, LRU eviction and
//! lazily evaluated staleness.

mod entry;
pub(crate) mod flight;
pub(crate) mod loading;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::EntryState;
pub use loading::{CacheBuilder, LoadFuture, Loader, LoadingCache};
pub use stats::CacheStats;

// Storage internals, only reachable through the cache's lock
pub(crate) use entry::CacheEntry;
pub(crate) use lru::LruTracker;
pub(crate) use store::CacheStore;
