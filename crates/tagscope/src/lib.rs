//! Tagscope - natural-language access to an industrial historian.
//!
//! Resolves loose tag descriptions to historian paths and reads time-series
//! data through a pooled, retrying, circuit-broken client with a shared
//! response cache.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tagscope::{build_service, load_config, ReadRequest};
//! use tagscope::resolver::ResolveRequest;
//! ```

pub use tagscope_cache as cache;
pub use tagscope_client as client;
pub use tagscope_models as models;
pub use tagscope_resolver as resolver;

pub mod payload;
pub mod service;

pub use service::{ReadRequest, Service};

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tagscope_cache::{Catalog, CatalogReader};
use tagscope_client::{ClientSettings, EnvCredential, HttpTransport, ResilientClient};
use tagscope_models::config::TagscopeConfig;

/// Read, parse and validate a TOML configuration file.
pub fn load_config(path: &str) -> Result<TagscopeConfig, anyhow::Error> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {path}"))?;
    let config: TagscopeConfig =
        toml::from_str(&raw).with_context(|| format!("Failed to parse config: {path}"))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Build a Service from configuration: HTTP transport with an environment
/// credential, resilient client, catalog and resolver.
pub fn build_service(config: &TagscopeConfig) -> Result<Service, anyhow::Error> {
    let credential = Arc::new(EnvCredential::new(config.historian.token_env.clone()));
    let transport = Arc::new(HttpTransport::new(config, credential)?);
    let client = Arc::new(ResilientClient::new(transport, ClientSettings::from(config)));

    let reader = CatalogReader::open(&config.cache.catalog_sqlite_path).with_context(|| {
        format!("Failed to open catalog DB: {}", config.cache.catalog_sqlite_path)
    })?;
    let catalog = Arc::new(Catalog::new(
        reader,
        config.cache.catalog_hot_capacity,
        Duration::from_secs(config.cache.catalog_hot_ttl_seconds),
        config.resolver.catalog_search_limit,
    ));

    Ok(Service::new(client, catalog, config)?)
}
