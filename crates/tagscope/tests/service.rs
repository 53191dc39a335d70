//! Tool-surface tests: the service over a scripted historian and an
//! in-memory catalog.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use tagscope::payload::encoded_len;
use tagscope::resolver::ResolveRequest;
use tagscope::{ReadRequest, Service};
use tagscope_cache::{Catalog, CatalogReader};
use tagscope_client::test_support::MockTransport;
use tagscope_client::{ClientSettings, ResilientClient};
use tagscope_models::catalog_schema::CatalogRow;
use tagscope_models::config::TagscopeConfig;
use tagscope_models::policy::{CircuitState, RetryPolicy};
use tagscope_models::read::ResponseSource;
use tagscope_models::remote::RemoteOperation;
use tagscope_models::text::search_text;
use tokio_util::sync::CancellationToken;

const SPEED: &str = "Views/Outao/Line1/Kiln/MainDrive/Speed";

fn config() -> TagscopeConfig {
    let mut config = TagscopeConfig::with_base_url("http://historian.test");
    config.historian.timezone = "Europe/Lisbon".to_string();
    config.client.retry.max_attempts = 1;
    config.client.breaker.failure_threshold = 1;
    config
}

fn service_with(mock: &Arc<MockTransport>, config: &TagscopeConfig) -> Service {
    let client = Arc::new(ResilientClient::new(
        mock.clone(),
        ClientSettings {
            retry: RetryPolicy {
                max_attempts: config.client.retry.max_attempts,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                jitter: false,
            },
            ..ClientSettings::from(config)
        },
    ));

    let reader = CatalogReader::open_in_memory().unwrap();
    reader
        .insert(&CatalogRow {
            path: SPEED.to_string(),
            name: "Speed".to_string(),
            data_type: Some("Float8".to_string()),
            description: None,
            site: CatalogRow::site_of(SPEED),
            search_text: search_text("Speed", SPEED, None),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        })
        .unwrap();
    let catalog = Arc::new(Catalog::new(reader, 100, Duration::from_secs(60), 200));

    Service::new(client, catalog, config).unwrap()
}

fn series(n: usize) -> serde_json::Value {
    let points: Vec<_> = (0..n)
        .map(|i| json!({"t": 1_784_109_600 + i as i64 * 60, "v": i as f64, "q": "good"}))
        .collect();
    json!({ "data": points })
}

#[tokio::test]
async fn read_returns_points_with_window() {
    let mock = Arc::new(MockTransport::new());
    mock.respond(RemoteOperation::GetTimeSeries, Ok(series(3)));
    let service = service_with(&mock, &config());
    let reference = Utc.with_ymd_and_hms(2026, 7, 15, 12, 0, 0).unwrap();

    let response = service
        .read_at(&ReadRequest::new(vec![SPEED.to_string()], "last 2 hours"), reference)
        .await;

    assert!(response.error.is_none(), "{:?}", response.error);
    assert_eq!(response.count, 3);
    assert_eq!(response.data[0].tag, SPEED);
    assert_eq!(response.source, Some(ResponseSource::Network));
    let range = response.time_range.unwrap();
    assert_eq!(range.duration(), chrono::Duration::hours(2));
    assert_eq!(range.timezone, "Europe/Lisbon");

    let sent = &mock.requests()[0];
    assert_eq!(sent.page_size, Some(config().limits.default_page_size));
    assert_eq!(sent.tags, vec![SPEED.to_string()]);
}

#[tokio::test]
async fn multi_tag_read_does_not_guess_point_owners() {
    const RPM: &str = "Views/Outao/Line1/Kiln/MainDrive/RPM";
    let tags = vec![SPEED.to_string(), RPM.to_string()];
    let reference = Utc.with_ymd_and_hms(2026, 7, 15, 12, 0, 0).unwrap();

    let mock = Arc::new(MockTransport::new());
    mock.respond(RemoteOperation::GetTimeSeries, Ok(series(3)));
    let service = service_with(&mock, &config());
    let flat = service
        .read_at(&ReadRequest::new(tags.clone(), "last 2 hours"), reference)
        .await;
    assert!(flat.error.is_none());
    assert_eq!(flat.count, 0);
    assert!(flat.notes.iter().any(|n| n.contains("did not name their tag")), "{:?}", flat.notes);

    let mock = Arc::new(MockTransport::new());
    mock.respond(
        RemoteOperation::GetTimeSeries,
        Ok(json!({
            SPEED: [[1_784_109_600_i64, 12.5]],
            RPM: [[1_784_109_600_i64, 900]],
        })),
    );
    let service = service_with(&mock, &config());
    let keyed = service
        .read_at(&ReadRequest::new(tags, "last 2 hours"), reference)
        .await;
    assert_eq!(keyed.count, 2);
    assert!(keyed.data.iter().any(|p| p.tag == RPM));
    assert!(keyed.notes.is_empty());
}

#[tokio::test]
async fn repeated_read_is_served_from_cache_unless_bypassed() {
    let mock = Arc::new(MockTransport::new());
    mock.respond(RemoteOperation::GetTimeSeries, Ok(series(2)));
    let service = service_with(&mock, &config());
    let reference = Utc.with_ymd_and_hms(2026, 7, 15, 12, 0, 0).unwrap();
    let request = ReadRequest::new(vec![SPEED.to_string()], "yesterday");

    service.read_at(&request, reference).await;
    let cached = service.read_at(&request, reference).await;
    assert_eq!(cached.source, Some(ResponseSource::Cache));
    assert_eq!(mock.attempts(), 1);

    let fresh = service
        .read_at(&ReadRequest { bypass_cache: true, ..request }, reference)
        .await;
    assert_eq!(fresh.source, Some(ResponseSource::Network));
    assert_eq!(mock.attempts(), 2);
}

#[tokio::test]
async fn bad_time_expression_is_reported_not_raised() {
    let mock = Arc::new(MockTransport::new());
    let service = service_with(&mock, &config());

    let response = service
        .read(&ReadRequest::new(vec![SPEED.to_string()], "the other day"))
        .await;
    assert!(response.error.as_deref().unwrap().contains("'the other day'"));
    assert_eq!(response.count, 0);
    assert_eq!(mock.attempts(), 0);
}

#[tokio::test]
async fn read_without_tags_is_reported() {
    let mock = Arc::new(MockTransport::new());
    let service = service_with(&mock, &config());

    let response = service.read(&ReadRequest::new(vec![" ".to_string()], "last hour")).await;
    assert!(response.error.as_deref().unwrap().contains("no tag names"));
    assert_eq!(mock.attempts(), 0);
}

#[tokio::test]
async fn open_circuit_read_carries_remediation() {
    let mock = Arc::new(MockTransport::always(MockTransport::network_error()));
    let service = service_with(&mock, &config());
    let request = ReadRequest::new(vec![SPEED.to_string()], "last 24 hours");

    let first = service.read(&request).await;
    assert!(first.error.is_some());
    assert_eq!(service.health().circuit_state, CircuitState::Open);

    let second = service.read(&request).await;
    let error = second.error.unwrap();
    assert!(error.contains("circuit open; retry after"), "{error}");
    assert!(second.time_range.is_some());
    assert_eq!(mock.attempts(), 1);
}

#[tokio::test]
async fn oversized_read_is_truncated_with_guidance() {
    let mock = Arc::new(MockTransport::new());
    mock.respond(RemoteOperation::GetTimeSeries, Ok(series(2_000)));
    let mut config = config();
    config.limits.max_payload_bytes = 8 * 1024;
    let service = service_with(&mock, &config);

    let response = service
        .read(&ReadRequest::new(vec![SPEED.to_string()], "last 24 hours"))
        .await;
    assert!(response.truncated);
    assert!(response.count < 2_000);
    assert!(response.guidance.is_some());
    assert!(encoded_len(&response) <= 8 * 1024);
}

#[tokio::test]
async fn resolve_goes_through_the_service() {
    let mock = Arc::new(MockTransport::new());
    let service = service_with(&mock, &config());

    let result = service
        .resolve(&ResolveRequest::new("kiln main drive speed"))
        .await
        .unwrap();
    assert_eq!(result.candidates[0].candidate.path, SPEED);
    assert!(result.clarifying_question.is_none());
}

#[tokio::test]
async fn invalidate_and_health_reflect_cache() {
    let mock = Arc::new(MockTransport::new());
    mock.respond(RemoteOperation::GetTimeSeries, Ok(series(1)));
    let service = service_with(&mock, &config());

    service
        .read(&ReadRequest::new(vec![SPEED.to_string()], "last 24 hours"))
        .await;
    service
        .resolve(&ResolveRequest::new("kiln speed"))
        .await
        .unwrap();

    let health = service.health();
    assert_eq!(health.circuit_state, CircuitState::Closed);
    assert_eq!(health.cache.entry_count, 2);
    assert_eq!(health.client.requests, 2);
    assert_eq!(health.pool.in_use, 0);

    let removed = service
        .invalidate_cache("historian:get_time_series:*")
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(service.cache_stats().entry_count, 1);

    assert_eq!(service.invalidate_cache("*").unwrap(), 1);
    assert_eq!(service.cache_stats().entry_count, 0);
}

#[tokio::test]
async fn maintenance_stops_on_cancel() {
    let mock = Arc::new(MockTransport::new());
    let mut config = config();
    config.cache.cleanup_interval_seconds = 1;
    let service = Arc::new(service_with(&mock, &config));

    let cancel = CancellationToken::new();
    let handle = service.spawn_maintenance(cancel.clone());
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("maintenance task should stop")
        .unwrap();
}

#[test]
fn shipped_config_loads_and_validates() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/tagscope.toml");
    let config = tagscope::load_config(path).unwrap();
    assert_eq!(config.historian.timezone, "Europe/Lisbon");
    assert_eq!(config.resolver.sites["outao"], "Views/Outao");
    assert_eq!(config.resolver.synonyms.len(), 3);
}

#[test]
fn missing_config_file_is_reported() {
    let err = tagscope::load_config("/nonexistent/tagscope.toml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config"));
}
