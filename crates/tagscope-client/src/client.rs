use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tagscope_cache::{CacheKey, CacheSettings, ResponseCache};
use tagscope_models::config::TagscopeConfig;
use tagscope_models::policy::{CircuitState, RetryPolicy};
use tagscope_models::read::ResponseSource;
use tagscope_models::remote::RemoteRequest;
use tagscope_models::stats::{CacheStats, ClientStats, PoolStats};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::breaker::CircuitBreaker;
use crate::error::{ClientError, RemoteError, RemoteErrorKind};
use crate::pool::ConnectionPool;
use crate::retry::{with_retry, RetryError, Retryable};
use crate::transport::{Transport, TransportError};

/// Cache namespace for historian responses.
pub const HISTORIAN_NAMESPACE: &str = "historian";

/// Time windows in cache keys are floored to this many seconds.
const WINDOW_GRANULARITY_SECS: i64 = 60;

/// Per-call options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Skip the cache read and go to the network. The entry is still refreshed.
    pub bypass_cache: bool,
    /// No new attempt is started after this instant.
    pub deadline: Option<Instant>,
}

impl CallOptions {
    pub fn bypass(mut self, bypass_cache: bool) -> Self {
        self.bypass_cache = bypass_cache;
        self
    }

    pub fn deadline_in(mut self, budget: Duration) -> Self {
        self.deadline = Some(Instant::now() + budget);
        self
    }
}

/// Successful answer from [`ResilientClient::execute`].
#[derive(Debug, Clone)]
pub struct Response {
    pub body: Arc<Value>,
    pub source: ResponseSource,
    /// Attempts made for this call, including ones refused by the breaker; 0 on a cache hit.
    pub attempts: u32,
}

/// Timing and sizing knobs, usually built from [`TagscopeConfig`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub pool_size: usize,
    pub pool_acquire_timeout: Duration,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub metadata_ttl: Duration,
    pub timeseries_ttl: Duration,
    pub cache: CacheSettings,
}

impl From<&TagscopeConfig> for ClientSettings {
    fn from(config: &TagscopeConfig) -> Self {
        Self {
            pool_size: config.client.pool_size,
            pool_acquire_timeout: config.client.pool_acquire_timeout(),
            request_timeout: config.client.request_timeout(),
            retry: config.client.retry.policy(),
            failure_threshold: config.client.breaker.failure_threshold,
            cooldown: config.client.breaker.cooldown(),
            metadata_ttl: Duration::from_secs(config.cache.metadata_ttl_seconds),
            timeseries_ttl: Duration::from_secs(config.cache.timeseries_ttl_seconds),
            cache: CacheSettings::from(&config.cache),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from(&TagscopeConfig::with_base_url("http://localhost"))
    }
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    network_attempts: AtomicU64,
    retries: AtomicU64,
    cache_served: AtomicU64,
    stale_served: AtomicU64,
    transient_failures: AtomicU64,
    permanent_failures: AtomicU64,
    circuit_rejections: AtomicU64,
    timeouts: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self, kind: RemoteErrorKind) {
        match kind {
            RemoteErrorKind::Transient => Self::bump(&self.transient_failures),
            RemoteErrorKind::Permanent => Self::bump(&self.permanent_failures),
            RemoteErrorKind::CircuitOpen => Self::bump(&self.circuit_rejections),
            RemoteErrorKind::Timeout => Self::bump(&self.timeouts),
        }
    }
}

/// Failure of a single attempt, as seen by the retry wrapper.
#[derive(Debug)]
enum AttemptError {
    Remote(RemoteError),
    /// Pool wait ran out. Not retried: the caller already waited its bounded time.
    PoolExhausted(RemoteError),
    Config(String),
}

impl Retryable for AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Remote(e) => e.kind.is_retryable(),
            AttemptError::PoolExhausted(_) | AttemptError::Config(_) => false,
        }
    }
}

/// Single choke point for historian calls: cache, pool, per-attempt timeout,
/// retry with backoff and jitter, circuit breaker and stale-cache degradation.
///
/// One instance per historian endpoint. Its breaker and pool are owned here and
/// injected into callers by sharing the client.
pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    cache: Arc<ResponseCache<Value>>,
    pool: ConnectionPool,
    breaker: CircuitBreaker,
    settings: ClientSettings,
    counters: Counters,
}

impl ResilientClient {
    pub fn new(transport: Arc<dyn Transport>, settings: ClientSettings) -> Self {
        let cache = Arc::new(ResponseCache::new(settings.cache));
        Self::with_cache(transport, cache, settings)
    }

    /// Build around an existing response cache, e.g. one shared with other components.
    pub fn with_cache(
        transport: Arc<dyn Transport>,
        cache: Arc<ResponseCache<Value>>,
        settings: ClientSettings,
    ) -> Self {
        Self {
            transport,
            cache,
            pool: ConnectionPool::new(settings.pool_size, settings.pool_acquire_timeout),
            breaker: CircuitBreaker::new(
                HISTORIAN_NAMESPACE,
                settings.failure_threshold,
                settings.cooldown,
            ),
            settings,
            counters: Counters::default(),
        }
    }

    /// Deterministic cache key for a request.
    pub fn cache_key(request: &RemoteRequest) -> String {
        let mut key = CacheKey::new(HISTORIAN_NAMESPACE, request.operation.name());
        if let Some(path) = &request.path {
            key = key.text("path", path);
        }
        if let Some(query) = &request.query {
            key = key.text("query", &query.to_lowercase());
        }
        if !request.tags.is_empty() {
            key = key.list("tags", &request.tags);
        }
        if let Some(range) = &request.time_range {
            key = key
                .window("range", &range.start, &range.end, WINDOW_GRANULARITY_SECS)
                .param("timezone", range.timezone.as_str());
        }
        if let Some(page_size) = request.page_size {
            key = key.param("page_size", page_size);
        }
        if let Some(limit) = request.limit {
            key = key.param("limit", limit);
        }
        key.build()
    }

    fn ttl_for(&self, request: &RemoteRequest) -> Duration {
        if request.operation.is_metadata() {
            self.settings.metadata_ttl
        } else {
            self.settings.timeseries_ttl
        }
    }

    /// Run one historian request through cache, pool, retry and breaker.
    pub async fn execute(
        &self,
        request: &RemoteRequest,
        options: CallOptions,
    ) -> Result<Response, ClientError> {
        Counters::bump(&self.counters.requests);
        let operation = request.operation.name();
        let key = Self::cache_key(request);

        if !options.bypass_cache {
            if let Some(body) = self.cache.get(&key) {
                Counters::bump(&self.counters.cache_served);
                debug!(operation, key = %key, "Served from cache");
                return Ok(Response {
                    body,
                    source: ResponseSource::Cache,
                    attempts: 0,
                });
            }
        }

        let started = Instant::now();
        let outcome = with_retry(&self.settings.retry, options.deadline, |attempt, remaining| {
            if attempt > 1 {
                Counters::bump(&self.counters.retries);
            }
            self.attempt(request, remaining)
        })
        .await;

        match outcome {
            Ok((body, attempts)) => {
                let body = Arc::new(body);
                self.cache.set(&key, Arc::clone(&body), self.ttl_for(request));
                debug!(
                    operation,
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Historian call succeeded"
                );
                Ok(Response {
                    body,
                    source: ResponseSource::Network,
                    attempts,
                })
            }
            Err(failure) => {
                let attempts = failure.attempts();
                let error = match failure {
                    RetryError::Aborted { error, .. } | RetryError::Exhausted { error, .. } => error,
                    RetryError::DeadlineExceeded { last, .. } => {
                        let detail = last
                            .map(|e| match e {
                                AttemptError::Remote(e) | AttemptError::PoolExhausted(e) => e.message,
                                AttemptError::Config(m) => m,
                            })
                            .map(|m| format!(" (last error: {m})"))
                            .unwrap_or_default();
                        AttemptError::Remote(RemoteError::new(
                            RemoteErrorKind::Timeout,
                            operation,
                            format!("caller deadline passed after {attempts} attempt(s){detail}"),
                        ))
                    }
                };

                let remote = match error {
                    AttemptError::Config(message) => return Err(ClientError::Config(message)),
                    AttemptError::Remote(e) | AttemptError::PoolExhausted(e) => e,
                };
                self.counters.record_failure(remote.kind);

                if remote.kind != RemoteErrorKind::Permanent {
                    if let Some(stale) = self.cache.get_stale(&key) {
                        Counters::bump(&self.counters.stale_served);
                        warn!(
                            operation,
                            kind = %remote.kind,
                            age_seconds = stale.age.as_secs(),
                            "Historian unavailable, serving cached response"
                        );
                        return Ok(Response {
                            body: stale.value,
                            source: if stale.stale {
                                ResponseSource::StaleCache
                            } else {
                                ResponseSource::Cache
                            },
                            attempts,
                        });
                    }
                }

                warn!(operation, attempts, error = %remote, "Historian call failed");
                Err(ClientError::Remote(remote))
            }
        }
    }

    async fn attempt(
        &self,
        request: &RemoteRequest,
        remaining: Option<Duration>,
    ) -> Result<Value, AttemptError> {
        let operation = request.operation.name();
        let queued = Instant::now();

        // Breaker first: an open circuit must not make callers queue on the pool.
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(retry_after) => {
                return Err(AttemptError::Remote(
                    RemoteError::new(
                        RemoteErrorKind::CircuitOpen,
                        operation,
                        "historian circuit breaker is open; no request was sent",
                    )
                    .with_retry_after(Some(retry_after)),
                ))
            }
        };

        // A HalfOpen trial permit dropped here releases the trial slot.
        let _slot = self
            .pool
            .acquire(operation, remaining)
            .await
            .map_err(AttemptError::PoolExhausted)?;

        let timeout = match remaining {
            Some(remaining) => self
                .settings
                .request_timeout
                .min(remaining.saturating_sub(queued.elapsed())),
            None => self.settings.request_timeout,
        };

        Counters::bump(&self.counters.network_attempts);
        let sent = tokio::time::timeout(timeout, self.transport.send(request, timeout)).await;
        let result = match sent {
            Ok(result) => result,
            Err(_elapsed) => Err(TransportError::Timeout(timeout)),
        };

        match result {
            Ok(body) => {
                permit.success();
                Ok(body)
            }
            Err(e) if e.is_credential() => {
                drop(permit);
                Err(AttemptError::Config(e.to_string()))
            }
            Err(e) => {
                let remote = e.into_remote(operation);
                if remote.kind.is_retryable() {
                    permit.failure();
                } else {
                    // The historian answered; it is reachable even if it rejected the request.
                    permit.success();
                }
                debug!(operation, kind = %remote.kind, error = %remote.message, "Attempt failed");
                Err(AttemptError::Remote(remote))
            }
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn cache(&self) -> &Arc<ResponseCache<Value>> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn stats(&self) -> ClientStats {
        let c = &self.counters;
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        ClientStats {
            requests: load(&c.requests),
            network_attempts: load(&c.network_attempts),
            retries: load(&c.retries),
            cache_served: load(&c.cache_served),
            stale_served: load(&c.stale_served),
            transient_failures: load(&c.transient_failures),
            permanent_failures: load(&c.permanent_failures),
            circuit_rejections: load(&c.circuit_rejections),
            timeouts: load(&c.timeouts),
        }
    }
}
