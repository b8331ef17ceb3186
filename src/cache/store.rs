//! Cache Store Module
//!
//! Bounded key/entry storage combining a HashMap with LRU tracking.
//! The store is a plain data structure; callers provide the locking.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

use crate::cache::{CacheEntry, CacheStats, LruTracker};

// == Cache Store ==
/// Bounded storage with LRU eviction of entries that are not loading.
#[derive(Debug)]
pub struct CacheStore<K, V> {
    /// Key-entry storage
    entries: HashMap<K, CacheEntry<V>>,
    /// LRU access tracker
    lru: LruTracker<K>,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_size: usize,
    /// Source of entry versions, bumped on every write
    next_version: u64,
    /// Bumped by every `clear`
    generation: u64,
}

impl<K, V> CacheStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates a new CacheStore holding at most `max_size` entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_size,
            next_version: 0,
            generation: 0,
        }
    }

    // == Lookup ==
    /// Returns the entry for `key` and marks it as recently used.
    pub fn lookup(&mut self, key: &K) -> Option<&CacheEntry<V>> {
        let entry = self.entries.get(key)?;
        self.lru.touch(key);
        Some(entry)
    }

    // == Upsert ==
    /// Inserts or replaces the entry for `key` with a fresh one written at `now`.
    ///
    /// A store over capacity evicts least recently used entries that are not
    /// loading, never `key` itself. When every other entry is loading nothing
    /// is evicted and the store briefly exceeds `max_size`.
    pub fn upsert(&mut self, key: K, value: V, now: Instant) {
        self.next_version += 1;
        let entry = CacheEntry::new(value, now, self.next_version);
        self.lru.touch(&key);
        self.entries.insert(key.clone(), entry);
        self.evict_overflow(Some(&key));
    }

    // == Trim ==
    /// Evicts entries until the store is back within `max_size`, or only
    /// loading entries are left.
    pub fn trim(&mut self) {
        self.evict_overflow(None);
    }

    fn evict_overflow(&mut self, keep: Option<&K>) {
        while self.entries.len() > self.max_size {
            if !self.evict_one(keep) {
                break;
            }
        }
        self.stats.set_total_entries(self.entries.len());
    }

    fn evict_one(&mut self, keep: Option<&K>) -> bool {
        let entries = &self.entries;
        let evicted = self.lru.evict_oldest_where(|k| {
            keep != Some(k) && entries.get(k).is_some_and(|e| !e.loading)
        });

        match evicted {
            Some(key) => {
                self.entries.remove(&key);
                self.stats.record_eviction();
                true
            }
            None => false,
        }
    }

    // == Remove ==
    /// Removes the entry for `key`, returning its value if one was stored.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.stats.set_total_entries(self.entries.len());
        Some(entry.value)
    }

    // == Clear ==
    /// Drops every entry and starts a new generation.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.generation += 1;
        self.stats.set_total_entries(0);
    }

    // == Loading Flag ==
    /// Sets or clears the loading flag of an existing entry.
    ///
    /// Returns false if the key has no entry.
    pub fn set_loading(&mut self, key: &K, loading: bool) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.loading = loading;
                true
            }
            None => false,
        }
    }

    // == Versions ==
    /// Version of the last write to `key`, or None if absent.
    pub fn version_of(&self, key: &K) -> Option<u64> {
        self.entries.get(key).map(|e| e.version)
    }

    /// Number of `clear` calls so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // == Snapshot ==
    /// Copies every stored key/value pair.
    pub fn snapshot(&self) -> HashMap<K, V> {
        self.entries
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    // == Stats ==
    /// Counters, with `total_entries` taken from the current size.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    /// Mutable access for recording hits, misses and loads.
    pub fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }

    // == Length ==
    /// Returns the current number of entries in the store.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_size: usize) -> CacheStore<String, u32> {
        CacheStore::new(max_size)
    }

    #[test]
    fn test_store_new() {
        let store = store(10);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_store_upsert_and_lookup() {
        let mut store = store(10);
        let now = Instant::now();

        store.upsert("key1".to_string(), 1, now);
        let entry = store.lookup(&"key1".to_string()).unwrap();

        assert_eq!(entry.value, 1);
        assert_eq!(entry.last_written_at, now);
        assert!(!entry.loading);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_lookup_nonexistent() {
        let mut store = store(10);
        assert!(store.lookup(&"missing".to_string()).is_none());
    }

    #[test]
    fn test_store_overwrite_bumps_version() {
        let mut store = store(10);
        let now = Instant::now();
        let key = "key1".to_string();

        store.upsert(key.clone(), 1, now);
        let first = store.version_of(&key).unwrap();
        store.upsert(key.clone(), 2, now);

        assert!(store.version_of(&key).unwrap() > first);
        assert_eq!(store.lookup(&key).unwrap().value, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_overwrite_resets_loading() {
        let mut store = store(10);
        let key = "key1".to_string();

        store.upsert(key.clone(), 1, Instant::now());
        assert!(store.set_loading(&key, true));
        store.upsert(key.clone(), 2, Instant::now());

        assert!(!store.lookup(&key).unwrap().loading);
    }

    #[test]
    fn test_store_lru_eviction() {
        let mut store = store(2);
        let now = Instant::now();

        store.upsert("a".to_string(), 1, now);
        store.upsert("b".to_string(), 2, now);
        store.upsert("c".to_string(), 3, now);

        assert_eq!(store.len(), 2);
        assert!(store.lookup(&"a".to_string()).is_none());
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_store_lru_touch_on_lookup() {
        let mut store = store(2);
        let now = Instant::now();

        store.upsert("a".to_string(), 1, now);
        store.upsert("b".to_string(), 2, now);
        store.lookup(&"a".to_string());
        store.upsert("c".to_string(), 3, now);

        assert!(store.lookup(&"a".to_string()).is_some());
        assert!(store.lookup(&"b".to_string()).is_none());
    }

    #[test]
    fn test_store_never_evicts_loading_entry() {
        let mut store = store(2);
        let now = Instant::now();

        store.upsert("a".to_string(), 1, now);
        store.upsert("b".to_string(), 2, now);
        store.set_loading(&"a".to_string(), true);
        store.upsert("c".to_string(), 3, now);

        assert!(store.lookup(&"a".to_string()).is_some());
        assert!(store.lookup(&"b".to_string()).is_none());
    }

    #[test]
    fn test_store_overshoots_when_everything_is_loading() {
        let mut store = store(1);
        let now = Instant::now();

        store.upsert("a".to_string(), 1, now);
        store.set_loading(&"a".to_string(), true);
        store.upsert("b".to_string(), 2, now);

        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().evictions, 0);
    }

    #[test]
    fn test_store_recovers_from_overshoot_on_overwrite() {
        let mut store = store(1);
        let now = Instant::now();
        let a = "a".to_string();

        store.upsert(a.clone(), 1, now);
        store.set_loading(&a, true);
        store.upsert("b".to_string(), 2, now);
        assert_eq!(store.len(), 2);

        // The reload of "a" lands as an overwrite and must shed the extra entry
        store.set_loading(&a, false);
        store.upsert(a.clone(), 10, now);

        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(&a).unwrap().value, 10);
        assert!(store.lookup(&"b".to_string()).is_none());

        store.upsert("c".to_string(), 3, now);
        store.upsert("d".to_string(), 4, now);
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot().get("d"), Some(&4));
    }

    #[test]
    fn test_store_trim_after_loading_ends() {
        let mut store = store(2);
        let now = Instant::now();

        for (key, value) in [("a", 1), ("b", 2)] {
            store.upsert(key.to_string(), value, now);
            store.set_loading(&key.to_string(), true);
        }
        store.upsert("c".to_string(), 3, now);
        store.upsert("d".to_string(), 4, now);

        // Only "c" could make room for "d"
        assert_eq!(store.len(), 3);
        assert!(store.lookup(&"c".to_string()).is_none());

        store.set_loading(&"a".to_string(), false);
        store.set_loading(&"b".to_string(), false);
        store.trim();

        assert_eq!(store.len(), 2);
        assert!(store.lookup(&"a".to_string()).is_none());
        assert!(store.lookup(&"b".to_string()).is_some());
        assert_eq!(store.stats().total_entries, 2);
    }

    #[test]
    fn test_store_never_evicts_the_key_being_written() {
        let mut store = store(1);
        let now = Instant::now();

        store.upsert("a".to_string(), 1, now);
        store.set_loading(&"a".to_string(), true);
        store.upsert("b".to_string(), 2, now);

        assert!(store.lookup(&"b".to_string()).is_some());
        assert!(store.lookup(&"a".to_string()).is_some());
    }

    #[test]
    fn test_store_remove() {
        let mut store = store(10);
        store.upsert("a".to_string(), 1, Instant::now());

        assert_eq!(store.remove(&"a".to_string()), Some(1));
        assert_eq!(store.remove(&"a".to_string()), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_clear_bumps_generation() {
        let mut store = store(10);
        store.upsert("a".to_string(), 1, Instant::now());
        store.upsert("b".to_string(), 2, Instant::now());

        store.clear();

        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());
        assert_eq!(store.generation(), 1);
        assert_eq!(store.stats().total_entries, 0);
    }

    #[test]
    fn test_store_snapshot_is_a_copy() {
        let mut store = store(10);
        store.upsert("a".to_string(), 1, Instant::now());

        let snapshot = store.snapshot();
        store.upsert("a".to_string(), 2, Instant::now());

        assert_eq!(snapshot.get("a"), Some(&1));
        assert_eq!(store.snapshot().get("a"), Some(&2));
    }

    #[test]
    fn test_set_loading_on_missing_key() {
        let mut store = store(10);
        assert!(!store.set_loading(&"missing".to_string(), true));
    }
}
