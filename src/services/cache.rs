//! Keyed, lazily populated client cache.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use tokio::sync::RwLock;
use tracing::debug;

/// A map of long-lived clients keyed by scope (region, host, ...).
///
/// Lookups of a populated key share a read lock. A miss takes the write lock
/// and checks again before initializing, so each key is built at most once.
#[derive(Debug)]
pub struct ClientCache<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for ClientCache<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> ClientCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    /// Returns the entry for `key`, building it with `init` on first use.
    pub async fn get_or_init<F, Fut>(&self, key: &K, init: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.entries.read().await.get(key) {
            return value.clone();
        }

        let mut entries = self.entries.write().await;
        if let Some(value) = entries.get(key) {
            return value.clone();
        }

        debug!("Initializing client for {:?}", key);
        let value = init().await;
        entries.insert(key.clone(), value.clone());
        value
    }

}
