//! Loading Cache Module
//!
//! Public cache handle: serves values from the store, loads missing ones
//! through the single-flight table, and applies the staleness policy.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::info;

use crate::cache::flight::{self, FlightTable, LoadKind, LoadOutcome, LoadTicket, OutcomeReceiver};
use crate::cache::{CacheStats, CacheStore, EntryState};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::spawn_load_task;

/// Boxed future returned by a loader.
pub type LoadFuture<V> = Pin<Box<dyn Future<Output = anyhow::Result<V>> + Send>>;

/// Type-erased loader function.
pub type Loader<K, V> = Arc<dyn Fn(K) -> LoadFuture<V> + Send + Sync>;

fn boxed_loader<K, V, F, Fut>(loader: F) -> Loader<K, V>
where
    K: 'static,
    V: 'static,
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
{
    Arc::new(move |key: K| Box::pin(loader(key)) as LoadFuture<V>)
}

// == Shared State ==
/// Store and flight table behind one lock. Critical sections are short and
/// never include a loader call.
pub(crate) struct CacheState<K, V> {
    store: CacheStore<K, V>,
    flights: FlightTable<K, V>,
}

pub(crate) struct Shared<K, V> {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    pub(crate) loader: Loader<K, V>,
    state: Mutex<CacheState<K, V>>,
}

/// What `get` does once the lock is released.
enum Plan<K, V> {
    /// Return this value now, optionally kicking off a background refresh
    Serve(V, Option<LoadTicket<K, V>>),
    /// Wait on a load, spawning it first if this caller started it
    Wait(OutcomeReceiver<V>, Option<LoadTicket<K, V>>),
}

impl<K, V> Shared<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    pub(crate) fn new(config: CacheConfig, loader: Loader<K, V>, clock: Arc<dyn Clock>) -> Self {
        let store = CacheStore::new(config.max_size);
        Self {
            config,
            clock,
            loader,
            state: Mutex::new(CacheState {
                store,
                flights: FlightTable::new(),
            }),
        }
    }

    // == Staleness Policy ==
    fn plan_get(&self, key: &K, now: Instant) -> Plan<K, V> {
        let mut guard = self.state.lock();
        let CacheState { store, flights } = &mut *guard;

        let found = store
            .lookup(key)
            .map(|entry| (entry.state(now, self.config.timeout), entry.value.clone()));

        match found {
            Some((EntryState::Fresh, value)) => {
                store.stats_mut().record_hit();
                Plan::Serve(value, None)
            }
            // Refresh-ahead: hand out the stale value, refresh at most once
            Some((_, value)) if !self.config.blocking_on_get => {
                store.stats_mut().record_stale_hit();
                let ticket = if flights.contains(key) {
                    None
                } else {
                    store.stats_mut().record_refresh();
                    Some(flights.start(key.clone(), LoadKind::Refresh, store).1)
                };
                Plan::Serve(value, ticket)
            }
            // Absent, or stale under the blocking policy
            _ => {
                store.stats_mut().record_miss();
                match flights.join(key) {
                    Some(receiver) => Plan::Wait(receiver, None),
                    None => {
                        store.stats_mut().record_load();
                        let (receiver, ticket) = flights.start(key.clone(), LoadKind::Load, store);
                        Plan::Wait(receiver, Some(ticket))
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn start_flight(&self, key: K, kind: LoadKind) -> (OutcomeReceiver<V>, LoadTicket<K, V>) {
        let mut guard = self.state.lock();
        let CacheState { store, flights } = &mut *guard;
        flights.start(key, kind, store)
    }

    pub(crate) fn settle(&self, ticket: LoadTicket<K, V>, outcome: LoadOutcome<V>) {
        let now = self.clock.now();
        let mut guard = self.state.lock();
        let CacheState { store, flights } = &mut *guard;
        flights.settle(store, ticket, outcome, now);
    }

    pub(crate) fn abandon(&self, ticket: LoadTicket<K, V>) {
        let mut guard = self.state.lock();
        let CacheState { store, flights } = &mut *guard;
        flights.abandon(store, ticket);
    }

    pub(crate) fn snapshot(&self) -> HashMap<K, V> {
        self.state.lock().store.snapshot()
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.state.lock().flights.len()
    }
}

// == Loading Cache ==
/// A bounded in-memory cache that computes missing values with a loader.
///
/// Concurrent `get`s for a key that needs loading share a single loader
/// invocation. Stale values are either reloaded while the reader waits
/// (`blocking_on_get`) or served immediately while a background refresh runs.
///
/// Handles are cheap to clone and share the same entries. Loads are spawned
/// on the ambient tokio runtime, so `get` must be called from within one.
///
/// # Example
/// ```no_run
/// # async fn example() -> loadcache::Result<()> {
/// use loadcache::{CacheConfig, LoadingCache};
///
/// let cache = LoadingCache::new(CacheConfig::default(), |key: String| async move {
///     Ok(key.len())
/// })?;
///
/// assert_eq!(cache.get(&"hello".to_string()).await?, 5);
/// # Ok(())
/// # }
/// ```
pub struct LoadingCache<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for LoadingCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> Debug for LoadingCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingCache")
            .field("config", &self.shared.config)
            .field("clock", &self.shared.clock)
            .finish_non_exhaustive()
    }
}

impl<K, V> LoadingCache<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructors ==
    /// Creates a cache using the system clock.
    ///
    /// # Errors
    /// [`CacheError::InvalidConfig`] if `config` fails validation.
    pub fn new<F, Fut>(config: CacheConfig, loader: F) -> Result<Self>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        Self::with_clock(config, loader, SystemClock)
    }

    /// Creates a cache that judges staleness with `clock`.
    pub fn with_clock<F, Fut, C>(config: CacheConfig, loader: F, clock: C) -> Result<Self>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
        C: Clock + 'static,
    {
        Self::from_parts(config, boxed_loader(loader), Arc::new(clock))
    }

    fn from_parts(config: CacheConfig, loader: Loader<K, V>, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        info!(
            max_size = config.max_size,
            timeout = ?config.timeout,
            blocking_on_get = config.blocking_on_get,
            "loading cache created"
        );
        Ok(Self {
            shared: Arc::new(Shared::new(config, loader, clock)),
        })
    }

    /// Starts a [`CacheBuilder`] with default settings.
    pub fn builder() -> CacheBuilder<K, V> {
        CacheBuilder::new()
    }

    // == Get ==
    /// Returns the value for `key`, loading it if needed.
    ///
    /// - Fresh entries are returned without calling the loader.
    /// - Absent keys wait for a load.
    /// - Stale entries wait for a reload under `blocking_on_get`; otherwise the
    ///   stale value is returned at once and a background refresh is started
    ///   unless one is already running.
    ///
    /// # Errors
    /// [`CacheError::Load`] with the loader's error if a load this call waited
    /// on failed, or [`CacheError::LoadAborted`] if it ended without a result.
    pub async fn get(&self, key: &K) -> Result<V> {
        let now = self.shared.clock.now();
        match self.shared.plan_get(key, now) {
            Plan::Serve(value, ticket) => {
                if let Some(ticket) = ticket {
                    spawn_load_task(Arc::clone(&self.shared), ticket);
                }
                Ok(value)
            }
            Plan::Wait(receiver, ticket) => {
                if let Some(ticket) = ticket {
                    spawn_load_task(Arc::clone(&self.shared), ticket);
                }
                flight::wait_for_outcome(receiver).await
            }
        }
    }

    // == Put ==
    /// Stores `value` for `key` as a fresh entry, bypassing the loader.
    ///
    /// A load for `key` already in flight still answers its waiters, but its
    /// result is not stored: the explicit write wins.
    pub fn put(&self, key: K, value: V) {
        let now = self.shared.clock.now();
        self.shared.state.lock().store.upsert(key, value, now);
    }

    /// Stores every pair as with [`LoadingCache::put`], under a single lock.
    pub fn put_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let now = self.shared.clock.now();
        let mut guard = self.shared.state.lock();
        for (key, value) in entries {
            guard.store.upsert(key, value, now);
        }
    }

    // == Invalidate ==
    /// Removes `key`, returning the value it held.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        self.shared.state.lock().store.remove(key)
    }

    // == Clear ==
    /// Drops every entry.
    ///
    /// Loads in flight are not cancelled. Their waiters still get the
    /// result, but it is not stored.
    pub fn clear(&self) {
        let mut guard = self.shared.state.lock();
        let dropped = guard.store.len();
        guard.store.clear();
        info!(dropped, in_flight = guard.flights.len(), "cache cleared");
    }

    // == Views ==
    /// Copies every stored key/value pair, fresh or stale.
    ///
    /// Keys being loaded for the first time are absent.
    pub fn snapshot(&self) -> HashMap<K, V> {
        self.shared.snapshot()
    }

    /// Number of stored entries.
    pub fn size(&self) -> usize {
        self.shared.state.lock().store.len()
    }

    /// Point-in-time copy of the hit, load and eviction counters.
    pub fn stats(&self) -> CacheStats {
        self.shared.state.lock().store.stats()
    }

    /// Settings the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }
}

// == Builder ==
/// Fluent construction of a [`LoadingCache`].
///
/// `build` fails if no loader was supplied or the settings are invalid.
pub struct CacheBuilder<K, V> {
    config: CacheConfig,
    loader: Option<Loader<K, V>>,
    clock: Option<Arc<dyn Clock>>,
}

impl<K, V> Default for CacheBuilder<K, V> {
    fn default() -> Self {
        Self {
            config: CacheConfig::default(),
            loader: None,
            clock: None,
        }
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a builder with default settings and no loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all settings with `config`.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the maximum number of entries.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.config.max_size = max_size;
        self
    }

    /// Sets the age at which an entry becomes stale.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Chooses between blocking reloads and refresh-ahead for stale entries.
    pub fn blocking_on_get(mut self, blocking_on_get: bool) -> Self {
        self.config.blocking_on_get = blocking_on_get;
        self
    }

    /// Sets the function that computes missing or stale values.
    pub fn loader<F, Fut>(mut self, loader: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        self.loader = Some(boxed_loader(loader));
        self
    }

    /// Sets the time source used to judge staleness.
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Validates the settings and creates the cache.
    ///
    /// # Errors
    /// [`CacheError::InvalidConfig`] if no loader was set or the settings are invalid.
    pub fn build(self) -> Result<LoadingCache<K, V>> {
        let loader = self
            .loader
            .ok_or_else(|| CacheError::InvalidConfig("a loader is required".to_string()))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        LoadingCache::from_parts(self.config, loader, clock)
    }
}
