//! Cache Statistics Module
//!
//! Tracks hits, misses, loads and evictions of a loading cache.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads served from a fresh entry
    pub hits: u64,
    /// Reads that had to wait for a load (absent key, or stale under the blocking policy)
    pub misses: u64,
    /// Reads served a stale value under the refresh-ahead policy
    pub stale_hits: u64,
    /// Loader invocations started on behalf of a waiting reader
    pub loads: u64,
    /// Waited-on loads that failed
    pub load_failures: u64,
    /// Background refreshes started
    pub refreshes: u64,
    /// Background refreshes that failed
    pub refresh_failures: u64,
    /// Entries evicted to stay within capacity
    pub evictions: u64,
    /// Load results not committed because a put or clear happened first
    pub discarded_loads: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Fraction of reads answered without waiting: (hits + stale_hits) / all reads.
    ///
    /// Returns 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.stale_hits;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_stale_hit(&mut self) {
        self.stale_hits += 1;
    }

    pub fn record_load(&mut self) {
        self.loads += 1;
    }

    pub fn record_load_failure(&mut self) {
        self.load_failures += 1;
    }

    pub fn record_refresh(&mut self) {
        self.refreshes += 1;
    }

    pub fn record_refresh_failure(&mut self) {
        self.refresh_failures += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_discarded_load(&mut self) {
        self.discarded_loads += 1;
    }

    // == Update Entry Count ==
    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
