use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tagscope_models::stats::CacheStats;
use tracing::{debug, warn};

use crate::error::CacheError;

/// Byte size charged against the cache budget for a stored value.
pub trait CacheWeight {
    fn weight(&self) -> usize;
}

impl CacheWeight for serde_json::Value {
    fn weight(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

impl CacheWeight for String {
    fn weight(&self) -> usize {
        self.len()
    }
}

/// Limits for a [`ResponseCache`].
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub max_bytes: u64,
    /// Entries created more recently than this are evicted only as a last resort.
    pub eviction_grace: Duration,
    /// How long past its TTL an entry remains readable through `get_stale`.
    pub stale_grace: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024,
            eviction_grace: Duration::from_secs(5),
            stale_grace: Duration::from_secs(3600),
        }
    }
}

impl From<&tagscope_models::CacheConfig> for CacheSettings {
    fn from(config: &tagscope_models::CacheConfig) -> Self {
        Self {
            max_bytes: config.max_bytes,
            eviction_grace: Duration::from_secs(config.eviction_grace_seconds),
            stale_grace: Duration::from_secs(config.stale_grace_seconds),
        }
    }
}

/// A value read back through [`ResponseCache::get_stale`].
#[derive(Debug, Clone)]
pub struct StaleRead<V> {
    pub value: Arc<V>,
    /// True when the entry is past its TTL.
    pub stale: bool,
    pub age: Duration,
}

struct Entry<V> {
    value: Arc<V>,
    created_at: Instant,
    ttl: Duration,
    size_bytes: u64,
    /// Recency tick; larger is more recent.
    last_access: u64,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }

    fn is_beyond_stale(&self, now: Instant, stale_grace: Duration) -> bool {
        now.duration_since(self.created_at) >= self.ttl.saturating_add(stale_grace)
    }
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    /// Recency tick -> key, oldest first.
    recency: BTreeMap<u64, String>,
    tick: u64,
    size_bytes: u64,
}

impl<V> Inner<V> {
    fn touch(&mut self, key: &str) {
        self.tick += 1;
        let tick = self.tick;
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.last_access);
            entry.last_access = tick;
            self.recency.insert(tick, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_access);
        self.size_bytes -= entry.size_bytes;
        Some(entry)
    }
}

/// Shared TTL + LRU key-value store with a byte budget.
///
/// Values are stored behind `Arc` and only ever replaced, so a reader racing a
/// writer sees either the old or the new value in full.
pub struct ResponseCache<V> {
    settings: CacheSettings,
    inner: Mutex<Inner<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    stale_hits: AtomicU64,
}

impl<V: CacheWeight> ResponseCache<V> {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                tick: 0,
                size_bytes: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            stale_hits: AtomicU64::new(0),
        }
    }

    /// Fresh value for `key`, or `None` when absent or past its TTL.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let (expired, beyond_stale) = match inner.entries.get(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(entry) => (
                entry.is_expired(now),
                entry.is_beyond_stale(now, self.settings.stale_grace),
            ),
        };

        if expired {
            if beyond_stale {
                inner.remove(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        inner.touch(key);
        self.hits.fetch_add(1, Ordering::Relaxed);
        inner.entries.get(key).map(|e| Arc::clone(&e.value))
    }

    /// Value for `key` even if expired, as long as it is within the stale window.
    /// Used for degraded serving when the historian is unavailable.
    pub fn get_stale(&self, key: &str) -> Option<StaleRead<V>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let (stale, beyond_stale, age) = {
            let entry = inner.entries.get(key)?;
            (
                entry.is_expired(now),
                entry.is_beyond_stale(now, self.settings.stale_grace),
                now.duration_since(entry.created_at),
            )
        };
        if beyond_stale {
            inner.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        inner.touch(key);
        if stale {
            self.stale_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        inner.entries.get(key).map(|e| StaleRead {
            value: Arc::clone(&e.value),
            stale,
            age,
        })
    }

    /// Insert or replace `key`. Returns false when the value alone exceeds the
    /// byte budget and was not stored.
    pub fn set(&self, key: &str, value: impl Into<Arc<V>>, ttl: Duration) -> bool {
        let value: Arc<V> = value.into();
        let size_bytes = (key.len() + value.weight()) as u64;
        if size_bytes > self.settings.max_bytes {
            warn!(
                key,
                size_bytes,
                max_bytes = self.settings.max_bytes,
                "Value larger than cache budget, not cached"
            );
            return false;
        }

        let mut inner = self.inner.lock();
        inner.remove(key);

        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                created_at: Instant::now(),
                ttl,
                size_bytes,
                last_access: tick,
            },
        );
        inner.recency.insert(tick, key.to_string());
        inner.size_bytes += size_bytes;

        self.evict_to_budget(&mut inner, key);
        true
    }

    /// Evict least-recently-accessed entries until the budget holds. Entries inside
    /// the eviction grace window are passed over while older candidates remain.
    fn evict_to_budget(&self, inner: &mut Inner<V>, protected: &str) {
        let now = Instant::now();
        while inner.size_bytes > self.settings.max_bytes {
            let victim = inner
                .recency
                .values()
                .filter(|k| k.as_str() != protected)
                .find(|k| {
                    inner
                        .entries
                        .get(k.as_str())
                        .is_some_and(|e| now.duration_since(e.created_at) >= self.settings.eviction_grace)
                })
                .or_else(|| {
                    inner
                        .recency
                        .values()
                        .find(|k| k.as_str() != protected)
                })
                .cloned();

            let Some(victim) = victim else {
                break;
            };
            if let Some(entry) = inner.remove(&victim) {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %victim, size_bytes = entry.size_bytes, "Evicted cache entry");
            }
        }
    }

    /// Remove every key matching a glob (`historian:get_time_series:*`) or, when the
    /// pattern has no glob metacharacters, a plain prefix. Returns the count removed.
    pub fn invalidate(&self, pattern: &str) -> Result<usize, CacheError> {
        let matcher: Box<dyn Fn(&str) -> bool> = if pattern.contains(['*', '?', '[']) {
            let glob = glob::Pattern::new(pattern).map_err(|e| CacheError::Pattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
            Box::new(move |key: &str| glob.matches(key))
        } else {
            let prefix = pattern.to_string();
            Box::new(move |key: &str| key.starts_with(&prefix))
        };

        let mut inner = self.inner.lock();
        let doomed: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| matcher(k.as_str()))
            .cloned()
            .collect();
        for key in &doomed {
            inner.remove(key);
        }
        debug!(pattern, removed = doomed.len(), "Invalidated cache entries");
        Ok(doomed.len())
    }

    /// Drop entries that are past both their TTL and the stale window.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let doomed: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_beyond_stale(now, self.settings.stale_grace))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            inner.remove(key);
        }
        self.expirations
            .fetch_add(doomed.len() as u64, Ordering::Relaxed);
        doomed.len()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            size_bytes: inner.size_bytes,
            max_bytes: self.settings.max_bytes,
            entry_count: inner.entries.len() as u64,
        }
    }
}
