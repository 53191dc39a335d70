//! Integration tests for the resilient client.
//!
//! Each test drives a `ResilientClient` against a scripted `MockTransport` and
//! checks network attempt counts, circuit state and cache behavior.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tagscope_client::test_support::MockTransport;
use tagscope_client::{CallOptions, ClientError, ClientSettings, RemoteErrorKind, ResilientClient};
use tagscope_models::policy::{CircuitState, RetryPolicy};
use tagscope_models::read::ResponseSource;
use tagscope_models::remote::{RemoteOperation, RemoteRequest};

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        jitter: true,
    }
}

fn settings(max_attempts: u32, failure_threshold: u32, cooldown: Duration) -> ClientSettings {
    ClientSettings {
        retry: fast_retry(max_attempts),
        failure_threshold,
        cooldown,
        ..ClientSettings::default()
    }
}

fn search(query: &str) -> RemoteRequest {
    RemoteRequest::search_tags("Views/Outao", query, 50)
}

#[tokio::test]
async fn failing_call_makes_exactly_max_attempts() {
    for max_attempts in [1, 3, 5] {
        let mock = Arc::new(MockTransport::always(MockTransport::server_error()));
        let client = ResilientClient::new(
            mock.clone(),
            settings(max_attempts, 100, Duration::from_secs(60)),
        );

        let err = client
            .execute(&search("kiln speed"), CallOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(RemoteErrorKind::Transient));
        assert_eq!(mock.attempts(), max_attempts);
        assert_eq!(client.stats().retries, u64::from(max_attempts - 1));
    }
}

#[tokio::test]
async fn transient_failures_then_success() {
    let mock = Arc::new(MockTransport::new());
    mock.push(RemoteOperation::SearchTags, MockTransport::network_error())
        .push(RemoteOperation::SearchTags, MockTransport::server_error())
        .push(RemoteOperation::SearchTags, Ok(json!([{"path": "Views/Outao/Kiln/Speed"}])));
    let client = ResilientClient::new(mock.clone(), settings(3, 5, Duration::from_secs(60)));

    let response = client
        .execute(&search("kiln speed"), CallOptions::default())
        .await
        .unwrap();
    assert_eq!(response.attempts, 3);
    assert_eq!(response.source, ResponseSource::Network);
    assert_eq!(client.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn five_failures_open_the_circuit_and_sixth_call_fails_fast() {
    let mock = Arc::new(MockTransport::always(MockTransport::network_error()));
    let client = ResilientClient::new(mock.clone(), settings(1, 5, Duration::from_secs(60)));

    for i in 0..5 {
        let err = client
            .execute(&search(&format!("query {i}")), CallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(RemoteErrorKind::Transient));
    }
    assert_eq!(mock.attempts(), 5);
    assert_eq!(client.circuit_state(), CircuitState::Open);

    let err = client
        .execute(&search("query 6"), CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(RemoteErrorKind::CircuitOpen));
    assert_eq!(mock.attempts(), 5, "no network attempt while open");
    assert!(err.to_string().contains("circuit open; retry after"));
    assert_eq!(client.stats().circuit_rejections, 1);
}

#[tokio::test]
async fn retries_stop_once_circuit_opens() {
    let mock = Arc::new(MockTransport::always(MockTransport::server_error()));
    let client = ResilientClient::new(mock.clone(), settings(5, 2, Duration::from_secs(60)));

    let err = client
        .execute(&search("kiln"), CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(RemoteErrorKind::CircuitOpen));
    assert_eq!(mock.attempts(), 2);
}

#[tokio::test]
async fn half_open_lets_one_trial_through_then_closes() {
    let mock = Arc::new(MockTransport::always(MockTransport::network_error()));
    let client = ResilientClient::new(mock.clone(), settings(1, 2, Duration::from_millis(50)));

    for i in 0..2 {
        let _ = client.execute(&search(&format!("q{i}")), CallOptions::default()).await;
    }
    assert_eq!(client.circuit_state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(client.circuit_state(), CircuitState::HalfOpen);

    mock.set_default(Ok(json!([])));
    mock.set_latency(Duration::from_millis(50));
    let client = Arc::new(client);
    let trial = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.execute(&search("trial"), CallOptions::default()).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Second caller arrives while the trial is in flight and is treated as open.
    let concurrent = client
        .execute(&search("concurrent"), CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(concurrent.kind(), Some(RemoteErrorKind::CircuitOpen));

    let trial = trial.await.unwrap().unwrap();
    assert_eq!(trial.source, ResponseSource::Network);
    assert_eq!(mock.attempts(), 3);
    assert_eq!(client.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn failed_trial_reopens_circuit() {
    let mock = Arc::new(MockTransport::always(MockTransport::server_error()));
    let client = ResilientClient::new(mock.clone(), settings(1, 1, Duration::from_millis(30)));

    let _ = client.execute(&search("a"), CallOptions::default()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let err = client
        .execute(&search("b"), CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(RemoteErrorKind::Transient));
    assert_eq!(client.circuit_state(), CircuitState::Open);
    assert_eq!(mock.attempts(), 2);
}

#[tokio::test]
async fn bypass_cache_hits_network_and_refreshes_entry() {
    let mock = Arc::new(MockTransport::new());
    mock.push(RemoteOperation::GetTagProperties, Ok(json!({"version": 1})))
        .push(RemoteOperation::GetTagProperties, Ok(json!({"version": 2})));
    let client = ResilientClient::new(mock.clone(), settings(1, 5, Duration::from_secs(60)));
    let request = RemoteRequest::tag_properties(vec!["Views/Outao/Kiln/Speed".into()]);

    let first = client.execute(&request, CallOptions::default()).await.unwrap();
    assert_eq!(first.body["version"], 1);

    let bypassed = client
        .execute(&request, CallOptions::default().bypass(true))
        .await
        .unwrap();
    assert_eq!(bypassed.source, ResponseSource::Network);
    assert_eq!(bypassed.body["version"], 2);
    assert_eq!(mock.attempts(), 2);

    // The fresh answer replaced the cached one.
    let cached = client.execute(&request, CallOptions::default()).await.unwrap();
    assert_eq!(cached.source, ResponseSource::Cache);
    assert_eq!(cached.body["version"], 2);
    assert_eq!(mock.attempts(), 2);
}

#[tokio::test]
async fn expired_entry_is_served_stale_when_historian_is_down() {
    let mock = Arc::new(MockTransport::new());
    mock.push(RemoteOperation::BrowseTags, Ok(json!([{"path": "Views/Outao/Kiln/Speed"}])));
    let mut s = settings(2, 10, Duration::from_secs(60));
    s.metadata_ttl = Duration::from_millis(20);
    let client = ResilientClient::new(mock.clone(), s);
    let request = RemoteRequest::browse_tags("Views/Outao/Kiln");

    client.execute(&request, CallOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;

    mock.set_default(MockTransport::server_error());
    let degraded = client.execute(&request, CallOptions::default()).await.unwrap();
    assert_eq!(degraded.source, ResponseSource::StaleCache);
    assert_eq!(degraded.body[0]["path"], "Views/Outao/Kiln/Speed");
    assert_eq!(degraded.attempts, 2);
    assert_eq!(client.stats().stale_served, 1);
}

#[tokio::test]
async fn open_circuit_is_served_from_cache_without_network() {
    let mock = Arc::new(MockTransport::new());
    let client = ResilientClient::new(mock.clone(), settings(1, 1, Duration::from_secs(60)));
    let cached_request = RemoteRequest::browse_tags("Views/Outao");

    client.execute(&cached_request, CallOptions::default()).await.unwrap();
    mock.set_default(MockTransport::network_error());
    let _ = client.execute(&search("trip"), CallOptions::default()).await;
    assert_eq!(client.circuit_state(), CircuitState::Open);

    let response = client
        .execute(&cached_request, CallOptions::default().bypass(true))
        .await
        .unwrap();
    assert_eq!(response.source, ResponseSource::Cache);
    assert_eq!(mock.attempts(), 2);
}

#[tokio::test]
async fn caller_deadline_stops_retrying() {
    let mock = Arc::new(MockTransport::always(MockTransport::server_error()));
    let slow_backoff = ClientSettings {
        retry: RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(40),
            max_delay: Duration::from_millis(40),
            jitter: false,
        },
        failure_threshold: 100,
        ..ClientSettings::default()
    };
    let client = ResilientClient::new(mock.clone(), slow_backoff);

    let err = client
        .execute(
            &search("kiln"),
            CallOptions::default().deadline_in(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(RemoteErrorKind::Timeout));
    assert!(mock.attempts() < 10);
    match err {
        ClientError::Remote(remote) => assert!(remote.message.contains("deadline")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn open_circuit_fails_fast_even_when_pool_is_busy() {
    let mock = Arc::new(MockTransport::always(MockTransport::network_error()));
    let client = Arc::new(ResilientClient::new(
        mock.clone(),
        ClientSettings {
            pool_size: 1,
            pool_acquire_timeout: Duration::from_secs(2),
            ..settings(1, 1, Duration::from_millis(50))
        },
    ));

    let _ = client.execute(&search("trip"), CallOptions::default()).await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(client.circuit_state(), CircuitState::HalfOpen);

    // The trial holds the only pool slot for a while.
    mock.set_default(Ok(json!([])));
    mock.set_latency(Duration::from_millis(500));
    let trial = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.execute(&search("trial"), CallOptions::default()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    let err = client
        .execute(&search("waiting"), CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(RemoteErrorKind::CircuitOpen));
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(client.pool_stats().acquire_timeouts, 0);

    assert!(trial.await.unwrap().is_ok());
    assert_eq!(client.circuit_state(), CircuitState::Closed);
    assert_eq!(mock.attempts(), 2);
}

#[tokio::test]
async fn caller_deadline_bounds_the_pool_wait() {
    let mock = Arc::new(MockTransport::new());
    mock.set_latency(Duration::from_millis(500));
    let client = Arc::new(ResilientClient::new(
        mock.clone(),
        ClientSettings {
            pool_size: 1,
            pool_acquire_timeout: Duration::from_secs(5),
            ..settings(3, 100, Duration::from_secs(60))
        },
    ));

    let busy = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.execute(&search("slow"), CallOptions::default()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    let err = client
        .execute(
            &search("hurried"),
            CallOptions::default().deadline_in(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(RemoteErrorKind::Timeout));
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(client.pool_stats().acquire_timeouts, 1);

    assert!(busy.await.unwrap().is_ok());
    assert_eq!(mock.attempts(), 1);
}

#[tokio::test]
async fn concurrent_callers_share_pool_and_cache() {
    let mock = Arc::new(MockTransport::new());
    mock.set_latency(Duration::from_millis(5));
    let client = Arc::new(ResilientClient::new(
        mock.clone(),
        ClientSettings {
            pool_size: 2,
            ..settings(1, 5, Duration::from_secs(60))
        },
    ));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .execute(&search(&format!("tag {}", i % 4)), CallOptions::default())
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let pool = client.pool_stats();
    assert_eq!(pool.max_size, 2);
    assert_eq!(pool.in_use, 0);
    assert!(mock.attempts() >= 4 && mock.attempts() <= 8);
    assert_eq!(client.cache_stats().entry_count, 4);
}
