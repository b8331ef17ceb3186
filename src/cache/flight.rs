//! Single-Flight Module
//!
//! Per-key bookkeeping of in-flight loads. At most one load per key is in
//! flight; every caller interested in that key holds a receiver on the same
//! `watch` channel and observes the same outcome.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::error::{CacheError, Result};

/// Result of one loader invocation, shared by all of its waiters.
pub(crate) type LoadOutcome<V> = std::result::Result<V, Arc<anyhow::Error>>;

/// Receiving side of an in-flight load.
pub(crate) type OutcomeReceiver<V> = watch::Receiver<Option<LoadOutcome<V>>>;

// == Load Kind ==
/// Why a load was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadKind {
    /// A reader is waiting for the value
    Load,
    /// Background refresh of a stale value; nobody waits for it
    Refresh,
}

struct Flight<V> {
    id: u64,
    receiver: OutcomeReceiver<V>,
}

// == Load Ticket ==
/// Ownership of one in-flight load, handed to the task that runs the loader.
///
/// Records the store generation and entry version observed when the load
/// started, so a result is only committed if no `put` or `clear` touched the
/// key in the meantime.
pub(crate) struct LoadTicket<K, V> {
    pub(crate) key: K,
    pub(crate) kind: LoadKind,
    id: u64,
    generation: u64,
    baseline: Option<u64>,
    sender: watch::Sender<Option<LoadOutcome<V>>>,
}

// == Flight Table ==
pub(crate) struct FlightTable<K, V> {
    flights: HashMap<K, Flight<V>>,
    next_id: u64,
}

impl<K, V> FlightTable<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            flights: HashMap::new(),
            next_id: 0,
        }
    }

    /// True while a load for `key` is in flight.
    pub(crate) fn contains(&self, key: &K) -> bool {
        self.flights.contains_key(key)
    }

    /// Returns a receiver on the in-flight load for `key`, if any.
    pub(crate) fn join(&self, key: &K) -> Option<OutcomeReceiver<V>> {
        self.flights.get(key).map(|f| f.receiver.clone())
    }

    /// Number of loads in flight.
    pub(crate) fn len(&self) -> usize {
        self.flights.len()
    }

    // == Start ==
    /// Registers a new load for `key` and marks its entry as loading.
    ///
    /// The caller must have checked that no load for `key` is in flight, and
    /// must hand the returned ticket to a task that eventually settles or
    /// abandons it.
    pub(crate) fn start(
        &mut self,
        key: K,
        kind: LoadKind,
        store: &mut CacheStore<K, V>,
    ) -> (OutcomeReceiver<V>, LoadTicket<K, V>) {
        self.next_id += 1;
        let id = self.next_id;
        let (sender, receiver) = watch::channel(None);

        store.set_loading(&key, true);
        let ticket = LoadTicket {
            key: key.clone(),
            kind,
            id,
            generation: store.generation(),
            baseline: store.version_of(&key),
            sender,
        };
        self.flights.insert(
            key,
            Flight {
                id,
                receiver: receiver.clone(),
            },
        );

        debug!(key = ?ticket.key, id, ?kind, "load started");
        (receiver, ticket)
    }

    fn finish(&mut self, ticket: &LoadTicket<K, V>, store: &mut CacheStore<K, V>) {
        if self.flights.get(&ticket.key).is_some_and(|f| f.id == ticket.id) {
            self.flights.remove(&ticket.key);
        }
        store.set_loading(&ticket.key, false);
    }

    // == Settle ==
    /// Completes a load: commits a successful value unless the key was
    /// written or the store cleared since the load started, then publishes
    /// the outcome to every waiter.
    pub(crate) fn settle(
        &mut self,
        store: &mut CacheStore<K, V>,
        ticket: LoadTicket<K, V>,
        outcome: LoadOutcome<V>,
        now: Instant,
    ) {
        self.finish(&ticket, store);

        match &outcome {
            Ok(value) => {
                let unchanged = store.generation() == ticket.generation
                    && store.version_of(&ticket.key) == ticket.baseline;
                if unchanged {
                    store.upsert(ticket.key.clone(), value.clone(), now);
                    debug!(key = ?ticket.key, id = ticket.id, "load committed");
                } else {
                    store.stats_mut().record_discarded_load();
                    debug!(
                        key = ?ticket.key,
                        id = ticket.id,
                        "load result discarded, key was written or cache cleared meanwhile"
                    );
                }
            }
            Err(err) => match ticket.kind {
                LoadKind::Load => {
                    store.stats_mut().record_load_failure();
                    debug!(key = ?ticket.key, id = ticket.id, error = %err, "load failed");
                }
                LoadKind::Refresh => {
                    store.stats_mut().record_refresh_failure();
                    warn!(
                        key = ?ticket.key,
                        id = ticket.id,
                        error = %err,
                        "background refresh failed, keeping stale value"
                    );
                }
            },
        }

        // The entry may have held the store over capacity while it loaded
        store.trim();
        ticket.sender.send_replace(Some(outcome));
    }

    // == Abandon ==
    /// Releases a load whose task ended without an outcome.
    ///
    /// Dropping the ticket closes the channel, which wakes waiters with
    /// [`CacheError::LoadAborted`].
    pub(crate) fn abandon(&mut self, store: &mut CacheStore<K, V>, ticket: LoadTicket<K, V>) {
        self.finish(&ticket, store);
        store.trim();
        warn!(key = ?ticket.key, id = ticket.id, "load aborted without an outcome");
    }
}

// == Wait ==
/// Waits until the load behind `receiver` publishes its outcome.
pub(crate) async fn wait_for_outcome<V: Clone>(mut receiver: OutcomeReceiver<V>) -> Result<V> {
    let outcome = receiver.wait_for(Option::is_some).await;
    match outcome.as_deref() {
        Ok(Some(Ok(value))) => Ok(value.clone()),
        Ok(Some(Err(err))) => Err(CacheError::Load(Arc::clone(err))),
        Ok(None) | Err(_) => Err(CacheError::LoadAborted),
    }
}
