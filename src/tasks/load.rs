//! Load Task
//!
//! Runs one loader invocation on the tokio runtime and settles its flight.
//!
//! The loader always runs in its own task, outside the cache lock, so a
//! caller that stops waiting (or a refresh nobody waits for) never leaves
//! the flight without an owner.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::cache::flight::LoadTicket;
use crate::cache::loading::Shared;

/// Settles the flight as abandoned if the task is dropped before the loader
/// returns (loader panic or runtime shutdown).
struct AbandonGuard<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    shared: Arc<Shared<K, V>>,
    ticket: Option<LoadTicket<K, V>>,
}

impl<K, V> Drop for AbandonGuard<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.shared.abandon(ticket);
        }
    }
}

/// Spawns the task that loads `ticket.key` and settles the ticket.
///
/// # Arguments
/// * `shared` - State of the cache the result is committed to
/// * `ticket` - Flight registered by the caller under the cache lock
///
/// # Returns
/// A JoinHandle for the spawned task. Callers normally drop it; waiters
/// observe the outcome through the flight's channel instead.
pub(crate) fn spawn_load_task<K, V>(shared: Arc<Shared<K, V>>, ticket: LoadTicket<K, V>) -> JoinHandle<()>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let key = ticket.key.clone();
        let mut guard = AbandonGuard {
            shared: Arc::clone(&shared),
            ticket: Some(ticket),
        };

        let outcome = (shared.loader)(key).await.map_err(Arc::new);

        if let Some(ticket) = guard.ticket.take() {
            shared.settle(ticket, outcome);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::flight::{wait_for_outcome, LoadKind};
    use crate::clock::SystemClock;
    use crate::config::CacheConfig;
    use crate::error::CacheError;

    fn shared<F>(loader: F) -> Arc<Shared<String, usize>>
    where
        F: Fn(String) -> anyhow::Result<usize> + Send + Sync + 'static,
    {
        let loader = Arc::new(loader);
        Arc::new(Shared::new(
            CacheConfig::default(),
            Arc::new(move |key: String| {
                let loader = Arc::clone(&loader);
                Box::pin(async move { loader(key) }) as crate::cache::loading::LoadFuture<usize>
            }),
            Arc::new(SystemClock),
        ))
    }

    #[tokio::test]
    async fn test_load_task_commits_value() {
        let shared = shared(|key| Ok(key.len()));
        let (rx, ticket) = shared.start_flight("abc".to_string(), LoadKind::Load);

        spawn_load_task(Arc::clone(&shared), ticket).await.unwrap();

        assert_eq!(wait_for_outcome(rx).await.unwrap(), 3);
        assert_eq!(shared.snapshot().get("abc"), Some(&3));
    }

    #[tokio::test]
    async fn test_load_task_panic_releases_waiters() {
        let shared = shared(|_| panic!("loader exploded"));
        let (rx, ticket) = shared.start_flight("abc".to_string(), LoadKind::Load);

        let joined = spawn_load_task(Arc::clone(&shared), ticket).await;

        assert!(joined.unwrap_err().is_panic());
        assert!(matches!(wait_for_outcome(rx).await, Err(CacheError::LoadAborted)));
        assert_eq!(shared.in_flight(), 0);
    }
}
