use std::hash::Hash;
use std::time::Duration;

use moka::future::Cache;

/// In-memory hot cache backed by moka.
///
/// Holds recently-read catalog lookups in front of SQLite. Entries are evicted
/// after TTL or when capacity is reached.
pub struct MemoryCache<K, V> {
    inner: Cache<K, V>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: K, value: V) {
        self.inner.insert(key, value).await;
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}
