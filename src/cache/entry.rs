//! Cache Entry Module
//!
//! Defines a stored value with the metadata used to judge staleness.

use std::time::{Duration, Instant};

// == Entry State ==
/// Lifecycle state of a stored entry, derived at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Younger than the timeout
    Fresh,
    /// Age has reached the timeout and no reload is running
    Stale,
    /// A reload for this key is in flight
    Loading,
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// When this entry was created
    #[allow(dead_code)]
    pub created_at: Instant,
    /// When the value was last written
    pub last_written_at: Instant,
    /// Store-wide write sequence number of the last write
    pub version: u64,
    /// Set while a reload for this key is in flight
    pub loading: bool,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a fresh entry written at `now`.
    pub fn new(value: V, now: Instant, version: u64) -> Self {
        Self {
            value,
            created_at: now,
            last_written_at: now,
            version,
            loading: false,
        }
    }

    // == Age ==
    /// Time elapsed since the last write.
    ///
    /// Saturates to zero if `now` is earlier than the write.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_written_at)
    }

    // == Is Stale ==
    /// An entry is stale once its age is greater than or equal to `timeout`.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        self.age(now) >= timeout
    }

    // == State ==
    pub fn state(&self, now: Instant, timeout: Duration) -> EntryState {
        if self.loading {
            EntryState::Loading
        } else if self.is_stale(now, timeout) {
            EntryState::Stale
        } else {
            EntryState::Fresh
        }
    }
}
