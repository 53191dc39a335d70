use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tagscope_models::stats::PoolStats;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use crate::error::{RemoteError, RemoteErrorKind};

/// Bounds concurrent historian requests. Callers beyond `max_size` queue on the
/// semaphore for at most `acquire_timeout` (or less, when the caller's own
/// budget is shorter), then fail with `Timeout`.
pub struct ConnectionPool {
    semaphore: Arc<Semaphore>,
    max_size: usize,
    acquire_timeout: Duration,
    acquisitions: AtomicU64,
    acquire_timeouts: AtomicU64,
}

/// Held for the duration of one network attempt; returns the slot on drop.
pub struct PoolGuard {
    _permit: OwnedSemaphorePermit,
}

impl ConnectionPool {
    pub fn new(max_size: usize, acquire_timeout: Duration) -> Self {
        let max_size = max_size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_size)),
            max_size,
            acquire_timeout,
            acquisitions: AtomicU64::new(0),
            acquire_timeouts: AtomicU64::new(0),
        }
    }

    /// Wait for a free slot. `budget` caps the wait below `acquire_timeout`.
    pub async fn acquire(
        &self,
        operation: &str,
        budget: Option<Duration>,
    ) -> Result<PoolGuard, RemoteError> {
        let wait = budget.map_or(self.acquire_timeout, |b| b.min(self.acquire_timeout));
        let acquired =
            tokio::time::timeout(wait, Arc::clone(&self.semaphore).acquire_owned()).await;
        match acquired {
            Ok(Ok(permit)) => {
                self.acquisitions.fetch_add(1, Ordering::Relaxed);
                Ok(PoolGuard { _permit: permit })
            }
            Ok(Err(_closed)) => Err(RemoteError::new(
                RemoteErrorKind::Permanent,
                operation,
                "connection pool is closed",
            )),
            Err(_elapsed) => {
                self.acquire_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    operation,
                    max_size = self.max_size,
                    wait_ms = wait.as_millis() as u64,
                    "Connection pool exhausted"
                );
                Err(RemoteError::new(
                    RemoteErrorKind::Timeout,
                    operation,
                    format!(
                        "no connection free within {}ms ({} in use)",
                        wait.as_millis(),
                        self.max_size
                    ),
                ))
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            max_size: self.max_size,
            in_use: self.max_size - self.semaphore.available_permits(),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            acquire_timeouts: self.acquire_timeouts.load(Ordering::Relaxed),
        }
    }
}
