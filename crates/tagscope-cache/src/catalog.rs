use std::sync::{Arc, Mutex};
use std::time::Duration;

use tagscope_models::tag::TagCandidate;
use tracing::debug;

use crate::error::CacheError;
use crate::memory::MemoryCache;
use crate::sqlite::CatalogReader;

/// Read-through catalog lookup: moka (hot) then SQLite.
///
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection` is not
/// `Sync`, and runs on the blocking pool so a slow scan does not stall the runtime.
pub struct Catalog {
    hot: MemoryCache<String, Arc<Vec<TagCandidate>>>,
    sqlite: Arc<Mutex<CatalogReader>>,
    search_limit: usize,
}

impl Catalog {
    pub fn new(reader: CatalogReader, hot_capacity: u64, hot_ttl: Duration, search_limit: usize) -> Self {
        Self {
            hot: MemoryCache::new(hot_capacity, hot_ttl),
            sqlite: Arc::new(Mutex::new(reader)),
            search_limit,
        }
    }

    fn hot_key(tokens: &[String]) -> String {
        let mut sorted: Vec<&str> = tokens.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();
        sorted.join(" ")
    }

    /// Catalog rows matching any of the normalized `tokens`.
    pub async fn search(&self, tokens: &[String]) -> Result<Arc<Vec<TagCandidate>>, CacheError> {
        let key = Self::hot_key(tokens);
        if let Some(hit) = self.hot.get(&key).await {
            return Ok(hit);
        }

        let sqlite = Arc::clone(&self.sqlite);
        let tokens = tokens.to_vec();
        let limit = self.search_limit;
        let rows = tokio::task::spawn_blocking(move || {
            let reader = sqlite
                .lock()
                .map_err(|e| CacheError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
            reader.search(&tokens, limit)
        })
        .await
        .map_err(|e| CacheError::Unavailable(format!("catalog search task failed: {e}")))??;

        let candidates: Arc<Vec<TagCandidate>> =
            Arc::new(rows.iter().map(|row| row.to_candidate()).collect());
        debug!(tokens = %key, matches = candidates.len(), "Catalog search");
        self.hot.insert(key, Arc::clone(&candidates)).await;
        Ok(candidates)
    }

    /// Drop hot entries, e.g. after the loader refreshed the database.
    pub fn clear_hot(&self) {
        self.hot.invalidate_all();
    }

    pub async fn sync_hot(&self) {
        self.hot.run_pending_tasks().await;
    }

    pub fn hot_entries(&self) -> u64 {
        self.hot.entry_count()
    }
}
