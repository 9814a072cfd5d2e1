//! Request coalescing: concurrent callers for the same key share one
//! execution and all receive a clone of its result.
//!
//! - The first caller for an idle key inserts a pending group and spawns the
//!   work as its own task, so the leader going away (client disconnect) does
//!   not strand the other waiters.
//! - Later callers find the group in the table and await the same shared
//!   receiver.
//! - The group is removed the moment the work finishes, before the result is
//!   broadcast, so the next caller after completion starts fresh.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{FutureExt, Shared};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// The in-flight execution ended without publishing a result (it panicked or
/// its runtime shut down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("in-flight computation ended without producing a result")]
pub struct Abandoned;

type PendingGroup<V, E> = Shared<oneshot::Receiver<Result<V, E>>>;

pub struct DedupGate<K, V, E> {
    groups: Arc<DashMap<K, PendingGroup<V, E>>>,
}

impl<K, V, E> Default for DedupGate<K, V, E>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self {
            groups: Arc::new(DashMap::new()),
        }
    }
}

impl<K, V, E> DedupGate<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<Abandoned> + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` unless an execution for `key` is already in flight, in which
    /// case wait for that one instead.
    pub async fn do_once<F, Fut>(&self, key: K, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let (group, leader) = match self.groups.entry(key.clone()) {
            Entry::Occupied(existing) => (existing.get().clone(), false),
            Entry::Vacant(slot) => {
                let group = rx.shared();
                slot.insert(group.clone());
                (group, true)
            }
        };

        if leader {
            // Armed before `f` runs so a panic while building the work still
            // frees the key.
            let release = Release {
                groups: self.groups.clone(),
                key: Some(key),
            };
            // The shard lock is released by now, so `f` may touch the gate.
            let work = f();
            tokio::spawn(async move {
                let result = work.await;
                drop(release);
                let _ = tx.send(result);
            });
        } else {
            debug!("joined in-flight execution");
        }

        group.await.unwrap_or_else(|_| Err(E::from(Abandoned)))
    }

    /// Number of keys with an execution currently running.
    pub fn in_flight(&self) -> usize {
        self.groups.len()
    }
}

/// Frees the key when the execution finishes, including by panic.
struct Release<K: Hash + Eq, V, E> {
    groups: Arc<DashMap<K, PendingGroup<V, E>>>,
    key: Option<K>,
}

impl<K: Hash + Eq, V, E> Drop for Release<K, V, E> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.groups.remove(&key);
        }
    }
}
