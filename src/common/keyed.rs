use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::dedup::{AsyncDeduplicator, SharedFetch};

/// Route `fetcher` through the deduplicator for `key` in a caller-owned map,
/// creating that deduplicator on first use.
///
/// Entries are never evicted here; see [`KeyedDeduplicator::prune_idle`].
pub fn fetch_keyed<K, T, E, F, Fut>(
    map: &DashMap<K, Arc<AsyncDeduplicator<T, E>>>,
    key: K,
    fetcher: F,
) -> SharedFetch<T, E>
where
    K: Eq + Hash + fmt::Debug,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let label = format!("{:?}", key);

    // Clone the Arc out so the shard lock is released before fetching
    let dedup = map
        .entry(key)
        .or_insert_with(|| {
            trace!(key = %label, "Creating deduplicator for key");
            Arc::new(AsyncDeduplicator::with_name(label))
        })
        .value()
        .clone();

    dedup.fetch(fetcher)
}

/// One [`AsyncDeduplicator`] per key: independent keys run in parallel,
/// duplicate requests for the same key collapse.
pub struct KeyedDeduplicator<K, T, E>
where
    K: Eq + Hash,
{
    inner: Arc<DashMap<K, Arc<AsyncDeduplicator<T, E>>>>,
    /// Debug name for this map (used in logging)
    name: String,
}

impl<K, T, E> KeyedDeduplicator<K, T, E>
where
    K: Eq + Hash + Clone + fmt::Debug,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_name("unnamed")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            name: name.into(),
        }
    }

    pub fn fetch<F, Fut>(&self, key: K, fetcher: F) -> SharedFetch<T, E>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        trace!(name = %self.name, ?key, "Keyed fetch");
        fetch_keyed(&self.inner, key, fetcher)
    }

    /// Invalidate the pending operation for `key`; returns whether the key is known
    pub fn invalidate(&self, key: &K) -> bool {
        match self.inner.get(key) {
            Some(dedup) => {
                dedup.invalidate();
                true
            }
            None => false,
        }
    }

    pub fn invalidate_all(&self) {
        debug!(name = %self.name, keys = self.inner.len(), "Invalidating all keys");
        self.inner.iter().for_each(|entry| entry.value().invalidate());
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.inner.get(key).is_some_and(|dedup| dedup.is_pending())
    }

    /// Number of keys that have a deduplicator (pending or idle)
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop deduplicators with nothing in flight; returns how many were removed
    pub fn prune_idle(&self) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, dedup| dedup.is_pending());
        let removed = before.saturating_sub(self.inner.len());
        debug!(name = %self.name, removed, "Pruned idle deduplicators");
        removed
    }

    /// Access to the underlying map, e.g. to share it with [`fetch_keyed`] call sites
    pub fn inner(&self) -> &Arc<DashMap<K, Arc<AsyncDeduplicator<T, E>>>> {
        &self.inner
    }
}

impl<K, T, E> Default for KeyedDeduplicator<K, T, E>
where
    K: Eq + Hash + Clone + fmt::Debug,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, T, E> Clone for KeyedDeduplicator<K, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            name: self.name.clone(),
        }
    }
}
