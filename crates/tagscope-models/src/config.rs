use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::RetryPolicy;

/// Startup configuration problems. Fatal, never recovered per-request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Top-level configuration for tagscope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagscopeConfig {
    pub historian: HistorianConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl TagscopeConfig {
    /// Config with defaults everywhere except the historian base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            historian: HistorianConfig {
                base_url: base_url.into(),
                token_env: default_token_env(),
                timezone: default_timezone(),
                endpoints: BTreeMap::new(),
            },
            client: ClientConfig::default(),
            cache: CacheConfig::default(),
            resolver: ResolverConfig::default(),
            limits: LimitsConfig::default(),
        }
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.historian.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("historian.base_url".to_string()));
        }
        if !self.historian.base_url.starts_with("http://")
            && !self.historian.base_url.starts_with("https://")
        {
            return Err(ConfigError::invalid(
                "historian.base_url",
                "must start with http:// or https://",
            ));
        }
        if self.historian.token_env.trim().is_empty() {
            return Err(ConfigError::Missing("historian.token_env".to_string()));
        }
        if self.historian.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::invalid(
                "historian.timezone",
                format!("unknown IANA timezone '{}'", self.historian.timezone),
            ));
        }
        if self.client.pool_size == 0 {
            return Err(ConfigError::invalid("client.pool_size", "must be at least 1"));
        }
        if self.client.retry.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "client.retry.max_attempts",
                "must be at least 1",
            ));
        }
        if self.client.retry.base_delay_ms > self.client.retry.max_delay_ms {
            return Err(ConfigError::invalid(
                "client.retry.base_delay_ms",
                "must not exceed max_delay_ms",
            ));
        }
        if self.client.breaker.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "client.breaker.failure_threshold",
                "must be at least 1",
            ));
        }
        if self.cache.max_bytes == 0 {
            return Err(ConfigError::invalid("cache.max_bytes", "must be positive"));
        }
        let r = &self.resolver;
        if !(0.0..=1.0).contains(&r.medium_threshold)
            || !(0.0..=1.0).contains(&r.high_threshold)
            || r.medium_threshold > r.high_threshold
        {
            return Err(ConfigError::invalid(
                "resolver",
                "thresholds must satisfy 0 <= medium_threshold <= high_threshold <= 1",
            ));
        }
        if !(0.0..=1.0).contains(&r.degraded_confidence_factor) {
            return Err(ConfigError::invalid(
                "resolver.degraded_confidence_factor",
                "must be within [0, 1]",
            ));
        }
        if r.default_top_k == 0 {
            return Err(ConfigError::invalid("resolver.default_top_k", "must be at least 1"));
        }
        if self.limits.max_payload_bytes < 1024 {
            return Err(ConfigError::invalid(
                "limits.max_payload_bytes",
                "must be at least 1024",
            ));
        }
        Ok(())
    }
}

/// Where the historian lives and how to authenticate against it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistorianConfig {
    /// Base URL of the historian REST API (e.g. `https://historian.plant.local/api`).
    pub base_url: String,
    /// Environment variable that holds the opaque access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Plant timezone (IANA name) used for relative time phrases.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Per-operation path overrides, keyed by operation name (e.g. `search_tags`).
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

/// Pool, timeout, retry and breaker settings for the resilient client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Maximum concurrent connections to the historian.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// How long a caller waits for a free connection before failing with Timeout.
    #[serde(default = "default_pool_acquire_timeout_ms")]
    pub pool_acquire_timeout_ms: u64,
    /// Independent deadline for each network attempt.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn pool_acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_acquire_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            pool_acquire_timeout_ms: default_pool_acquire_timeout_ms(),
            request_timeout_seconds: default_request_timeout_seconds(),
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failed attempts that trip the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long the breaker stays open before letting a trial call through.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

/// Configuration for the response cache and the static tag catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Byte budget for the response cache.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    /// TTL for metadata lookups (browse, search, tag properties).
    #[serde(default = "default_metadata_ttl")]
    pub metadata_ttl_seconds: u64,
    /// TTL for time-series reads.
    #[serde(default = "default_timeseries_ttl")]
    pub timeseries_ttl_seconds: u64,
    /// Entries younger than this are skipped by LRU eviction where possible.
    #[serde(default = "default_eviction_grace")]
    pub eviction_grace_seconds: u64,
    /// How long an expired entry stays available for degraded (stale) serving.
    #[serde(default = "default_stale_grace")]
    pub stale_grace_seconds: u64,
    /// Interval between proactive expired-entry sweeps.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
    /// Path to the SQLite tag catalog (written by tagscope-loader, read by tagscope).
    #[serde(default = "default_catalog_path")]
    pub catalog_sqlite_path: String,
    /// Maximum number of catalog searches kept in the moka hot cache.
    #[serde(default = "default_catalog_hot_capacity")]
    pub catalog_hot_capacity: u64,
    #[serde(default = "default_metadata_ttl")]
    pub catalog_hot_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            metadata_ttl_seconds: default_metadata_ttl(),
            timeseries_ttl_seconds: default_timeseries_ttl(),
            eviction_grace_seconds: default_eviction_grace(),
            stale_grace_seconds: default_stale_grace(),
            cleanup_interval_seconds: default_cleanup_interval(),
            catalog_sqlite_path: default_catalog_path(),
            catalog_hot_capacity: default_catalog_hot_capacity(),
            catalog_hot_ttl_seconds: default_metadata_ttl(),
        }
    }
}

/// Points awarded per matched query term. Heuristic; tune against real catalogs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreWeights {
    pub exact: f64,
    pub prefix: f64,
    pub contains: f64,
    pub fuzzy: f64,
    pub path: f64,
    pub synonym: f64,
    pub description: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            exact: 4.0,
            prefix: 3.0,
            contains: 2.0,
            fuzzy: 1.0,
            path: 2.0,
            synonym: 1.0,
            description: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolverConfig {
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: f64,
    /// Top-two score gap at or below which the ranking counts as ambiguous.
    #[serde(default = "default_tie_margin")]
    pub tie_margin: f64,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Multiplier applied to confidence when the live search could not run.
    #[serde(default = "default_degraded_factor")]
    pub degraded_confidence_factor: f64,
    #[serde(default = "default_fuzzy_distance")]
    pub fuzzy_max_distance: usize,
    /// Extra synonym groups, merged with the built-in table.
    #[serde(default)]
    pub synonyms: Vec<Vec<String>>,
    /// Site/area keyword → hint path (e.g. `outao = "Views/Outao"`).
    #[serde(default)]
    pub sites: BTreeMap<String, String>,
    /// Browse root used when nothing in the query names a site.
    #[serde(default)]
    pub default_root: String,
    #[serde(default = "default_live_search_limit")]
    pub live_search_limit: usize,
    #[serde(default = "default_catalog_search_limit")]
    pub catalog_search_limit: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
            tie_margin: default_tie_margin(),
            default_top_k: default_top_k(),
            degraded_confidence_factor: default_degraded_factor(),
            fuzzy_max_distance: default_fuzzy_distance(),
            synonyms: Vec::new(),
            sites: BTreeMap::new(),
            default_root: String::new(),
            live_search_limit: default_live_search_limit(),
            catalog_search_limit: default_catalog_search_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsConfig {
    /// Ceiling for any serialized tool response.
    #[serde(default = "default_max_payload")]
    pub max_payload_bytes: usize,
    /// Page size used for time-series reads when the caller gives none.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload(),
            default_page_size: default_page_size(),
        }
    }
}

fn default_token_env() -> String {
    "TAGSCOPE_HISTORIAN_TOKEN".to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_pool_size() -> usize {
    10
}
fn default_pool_acquire_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_seconds() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_cooldown_seconds() -> u64 {
    60
}
fn default_max_bytes() -> u64 {
    64 * 1024 * 1024
}
fn default_metadata_ttl() -> u64 {
    3600
}
fn default_timeseries_ttl() -> u64 {
    300
}
fn default_eviction_grace() -> u64 {
    5
}
fn default_stale_grace() -> u64 {
    3600
}
fn default_cleanup_interval() -> u64 {
    300
}
fn default_catalog_path() -> String {
    "data/tagscope_catalog.db".to_string()
}
fn default_catalog_hot_capacity() -> u64 {
    1000
}
fn default_high_threshold() -> f64 {
    0.80
}
fn default_medium_threshold() -> f64 {
    0.70
}
fn default_tie_margin() -> f64 {
    1.0
}
fn default_top_k() -> usize {
    5
}
fn default_degraded_factor() -> f64 {
    0.85
}
fn default_fuzzy_distance() -> usize {
    2
}
fn default_live_search_limit() -> usize {
    50
}
fn default_catalog_search_limit() -> usize {
    200
}
fn default_max_payload() -> usize {
    1024 * 1024
}
fn default_page_size() -> usize {
    1000
}
fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_from_toml() {
        let toml_str = r#"
[historian]
base_url = "https://historian.plant.local/api"
"#;
        let config: TagscopeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.historian.token_env, "TAGSCOPE_HISTORIAN_TOKEN");
        assert_eq!(config.client.pool_size, 10);
        assert_eq!(config.client.retry.max_attempts, 3);
        assert_eq!(config.client.breaker.failure_threshold, 5);
        assert_eq!(config.cache.metadata_ttl_seconds, 3600);
        assert_eq!(config.cache.timeseries_ttl_seconds, 300);
        assert_eq!(config.limits.max_payload_bytes, 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn full_config_from_toml() {
        let toml_str = r#"
[historian]
base_url = "https://historian.plant.local/api"
token_env = "PLANT_TOKEN"
timezone = "Europe/Lisbon"

[historian.endpoints]
search_tags = "/v2/tags/search"

[client]
pool_size = 4
request_timeout_seconds = 10

[client.retry]
max_attempts = 5
base_delay_ms = 100
max_delay_ms = 2000
jitter = false

[client.breaker]
failure_threshold = 3
cooldown_seconds = 30

[cache]
max_bytes = 1048576
catalog_sqlite_path = "/var/lib/tagscope/catalog.db"

[resolver]
high_threshold = 0.85
tie_margin = 0.5
default_root = "Views"

[resolver.sites]
outao = "Views/Outao"

[limits]
max_payload_bytes = 524288
"#;
        let config: TagscopeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.historian.timezone, "Europe/Lisbon");
        assert_eq!(
            config.historian.endpoints.get("search_tags").map(String::as_str),
            Some("/v2/tags/search")
        );
        assert_eq!(config.client.pool_size, 4);
        let policy = config.client.retry.policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
        assert!(!policy.jitter);
        assert_eq!(config.client.breaker.cooldown(), Duration::from_secs(30));
        assert_eq!(config.resolver.sites.get("outao").unwrap(), "Views/Outao");
        assert_eq!(config.resolver.medium_threshold, 0.70);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_base_url_is_config_error() {
        let config = TagscopeConfig::with_base_url("  ");
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing("historian.base_url".to_string()))
        );
    }

    #[test]
    fn unknown_timezone_rejected() {
        let mut config = TagscopeConfig::with_base_url("https://h.local");
        config.historian.timezone = "Mars/Olympus".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "historian.timezone"
        ));
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let mut config = TagscopeConfig::with_base_url("https://h.local");
        config.resolver.medium_threshold = 0.9;
        config.resolver.high_threshold = 0.8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = TagscopeConfig::with_base_url("https://h.local");
        config.client.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn roundtrip_config() {
        let config = TagscopeConfig::with_base_url("https://h.local");
        let json = serde_json::to_string(&config).unwrap();
        let parsed: TagscopeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
