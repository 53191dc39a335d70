use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tagscope_cache::{CacheError, Catalog};
use tagscope_client::response::parse_time_series;
use tagscope_client::{CallOptions, ResilientClient};
use tagscope_models::config::{LimitsConfig, TagscopeConfig};
use tagscope_models::read::{HealthReport, ReadResponse};
use tagscope_models::remote::RemoteRequest;
use tagscope_models::resolution::ResolutionResult;
use tagscope_models::stats::CacheStats;
use tagscope_resolver::time_expr::window;
use tagscope_resolver::{ResolveRequest, Resolver, ResolverError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::payload::{fit_read, fit_resolution};

fn default_end() -> String {
    "now".to_string()
}

/// Input to [`Service::read`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRequest {
    pub tag_names: Vec<String>,
    /// Time expression for the window start, e.g. `last 24 hours` or an ISO-8601 timestamp.
    pub start: String,
    #[serde(default = "default_end")]
    pub end: String,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub bypass_cache: bool,
}

impl ReadRequest {
    pub fn new(tag_names: Vec<String>, start: impl Into<String>) -> Self {
        Self {
            tag_names,
            start: start.into(),
            end: default_end(),
            page_size: None,
            bypass_cache: false,
        }
    }
}

/// The tool surface: resolve, read, cache control and health, over one
/// shared client, catalog and resolver.
pub struct Service {
    client: Arc<ResilientClient>,
    catalog: Arc<Catalog>,
    resolver: Resolver,
    limits: LimitsConfig,
    cleanup_interval: Duration,
}

impl Service {
    pub fn new(
        client: Arc<ResilientClient>,
        catalog: Arc<Catalog>,
        config: &TagscopeConfig,
    ) -> Result<Self, ResolverError> {
        let resolver = Resolver::from_config(Arc::clone(&client), Arc::clone(&catalog), config)?;
        Ok(Self {
            client,
            catalog,
            resolver,
            limits: config.limits.clone(),
            cleanup_interval: Duration::from_secs(config.cache.cleanup_interval_seconds.max(1)),
        })
    }

    pub fn client(&self) -> &Arc<ResilientClient> {
        &self.client
    }

    pub async fn resolve(&self, request: &ResolveRequest) -> Result<ResolutionResult, ResolverError> {
        let mut result = self.resolver.resolve(request).await?;
        fit_resolution(&mut result, self.limits.max_payload_bytes);
        Ok(result)
    }

    /// Read time-series data. Never fails: problems are reported in `error`.
    pub async fn read(&self, request: &ReadRequest) -> ReadResponse {
        self.read_at(request, Utc::now()).await
    }

    /// Read with an explicit reference instant for the time expressions.
    pub async fn read_at(&self, request: &ReadRequest, reference: DateTime<Utc>) -> ReadResponse {
        let request_id = Uuid::new_v4();
        let span = info_span!("read", request_id = %request_id);
        self.run_read(request_id, request, reference)
            .instrument(span)
            .await
    }

    async fn run_read(
        &self,
        request_id: Uuid,
        request: &ReadRequest,
        reference: DateTime<Utc>,
    ) -> ReadResponse {
        let tags: Vec<String> = request
            .tag_names
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tags.is_empty() {
            return ReadResponse::failed(
                request_id,
                "no tag names given; resolve a description to a tag path first",
            );
        }

        let range = match window(&request.start, &request.end, reference, self.resolver.timezone()) {
            Ok(range) => range,
            Err(e) => {
                debug!(error = %e, "Rejected read window");
                return ReadResponse::failed(request_id, e.to_string());
            }
        };

        let page_size = request
            .page_size
            .filter(|p| *p > 0)
            .unwrap_or(self.limits.default_page_size);
        let remote = RemoteRequest::time_series(tags.clone(), range.clone(), page_size);
        let options = CallOptions::default().bypass(request.bypass_cache);

        let response = match self.client.execute(&remote, options).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, tags = tags.len(), "Time-series read failed");
                let mut failed = ReadResponse::failed(request_id, e.to_string());
                failed.time_range = Some(range);
                return failed;
            }
        };

        let default_tag = match tags.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        };
        let listing = parse_time_series(&response.body, default_tag);
        let mut read = ReadResponse {
            request_id,
            count: listing.points.len(),
            data: listing.points,
            time_range: Some(range),
            source: Some(response.source),
            truncated: false,
            guidance: None,
            error: None,
            notes: listing.notes,
        };
        fit_read(&mut read, self.limits.max_payload_bytes);
        info!(
            tags = tags.len(),
            count = read.count,
            source = ?response.source,
            truncated = read.truncated,
            "Read complete"
        );
        read
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.client.cache_stats()
    }

    /// Drop response-cache entries matching a glob or key prefix. `*` also
    /// empties the catalog hot cache.
    pub fn invalidate_cache(&self, pattern: &str) -> Result<usize, CacheError> {
        let removed = self.client.cache().invalidate(pattern)?;
        if pattern.trim() == "*" {
            self.catalog.clear_hot();
        }
        info!(pattern, removed, "Cache invalidated");
        Ok(removed)
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            circuit_state: self.client.circuit_state(),
            pool: self.client.pool_stats(),
            client: self.client.stats(),
            cache: self.client.cache_stats(),
            catalog_hot_entries: self.catalog.hot_entries(),
        }
    }

    /// Periodically purge expired cache entries until `cancel` fires.
    pub fn spawn_maintenance(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.cleanup_interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Cache maintenance stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = service.client.cache().cleanup_expired();
                        service.catalog.sync_hot().await;
                        debug!(removed, "Cache maintenance pass");
                    }
                }
            }
        })
    }
}
