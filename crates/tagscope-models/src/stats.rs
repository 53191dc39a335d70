use serde::{Deserialize, Serialize};

/// Monotonic response-cache counters plus current occupancy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub stale_hits: u64,
    pub size_bytes: u64,
    pub max_bytes: u64,
    pub entry_count: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolStats {
    pub max_size: usize,
    pub in_use: usize,
    pub acquisitions: u64,
    pub acquire_timeouts: u64,
}

/// Resilient client counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientStats {
    pub requests: u64,
    pub network_attempts: u64,
    pub retries: u64,
    pub cache_served: u64,
    pub stale_served: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
    pub circuit_rejections: u64,
    pub timeouts: u64,
}
