//! Loadcache - An in-process loading cache
//!
//! Computes values on demand with a caller-supplied loader, shares one load
//! between concurrent readers of the same key, bounds its size with LRU
//! eviction, and treats values older than a timeout as stale.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
mod tasks;

pub use cache::{CacheBuilder, CacheStats, EntryState, LoadingCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
