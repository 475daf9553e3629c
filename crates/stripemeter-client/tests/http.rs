use std::time::Duration;

use serde_json::{json, Value};
use stripemeter_client::{
    AsyncMeteringClient, ClientConfig, ClientError, MeteringClient, NewEvent, USER_AGENT,
};
use wiremock::{
    matchers::{body_partial_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(server.uri(), "tenant_123")
        .with_api_key("test-key")
        .with_retry_delays(Duration::from_millis(10), Duration::from_millis(50))
}

async fn ingested_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/v1/events/ingest")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn track_sends_authenticated_json() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/events/ingest"))
        .and(header("authorization", "Bearer test-key"))
        .and(header("content-type", "application/json"))
        .and(header("user-agent", USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accepted": 1,
            "duplicates": 0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = AsyncMeteringClient::new(config(&server)).unwrap();
    let resp = client
        .track(NewEvent::new("api_calls", "cus_ABC", 100.0).with_resource_id("srv_1"))
        .await
        .unwrap();

    assert_eq!(resp.accepted, 1);
    assert_eq!(resp.duplicates, 0);
    assert!(resp.errors.is_none());

    let bodies = ingested_bodies(&server).await;
    let event = &bodies[0]["events"][0];
    assert_eq!(event["tenantId"], "tenant_123");
    assert_eq!(event["metric"], "api_calls");
    assert_eq!(event["customerRef"], "cus_ABC");
    assert_eq!(event["resourceId"], "srv_1");
    assert_eq!(event["quantity"], 100.0);
    assert_eq!(event["source"], "sdk");
    let key = event["idempotencyKey"].as_str().unwrap();
    assert!(key.starts_with("evt_"));
    assert_eq!(key.len(), 20);
}

#[tokio::test]
async fn partial_batch_failure_is_returned_as_data() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/events/ingest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accepted": 1,
            "duplicates": 0,
            "errors": [{ "index": 1, "error": "unknown metric" }]
        })))
        .mount(&server)
        .await;

    let client = AsyncMeteringClient::new(config(&server)).unwrap();
    let resp = client
        .track_batch(vec![
            NewEvent::new("api_calls", "cus_ABC", 1.0),
            NewEvent::new("mystery", "cus_ABC", 1.0),
        ])
        .await
        .unwrap();

    assert!(resp.has_errors());
    let errors = resp.errors.unwrap();
    assert_eq!(errors[0].index, 1);
    assert_eq!(errors[0].error, "unknown metric");
}

#[tokio::test]
async fn validation_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/events/ingest"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "message": "quantity too large" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = AsyncMeteringClient::new(config(&server)).unwrap();
    let err = client
        .track(NewEvent::new("api_calls", "cus_ABC", 1.0))
        .await
        .unwrap_err();

    match err {
        ClientError::Api { status, message, .. } => {
            assert_eq!(status, 422);
            assert_eq!(message, "quantity too large");
        }
        other => panic!("Expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_is_retried_until_attempts_run_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/events/ingest"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .expect(3)
        .mount(&server)
        .await;

    let client = AsyncMeteringClient::new(config(&server)).unwrap();
    let err = client
        .track(NewEvent::new("api_calls", "cus_ABC", 1.0))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 503);
    assert!(err.is_retryable());
    if let ClientError::Api { message, .. } = err {
        assert_eq!(message, "HTTP 503 Service Unavailable");
    }
}

#[tokio::test]
async fn retry_resends_the_same_idempotency_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/events/ingest"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/events/ingest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accepted": 1,
            "duplicates": 0
        })))
        .mount(&server)
        .await;

    let client = AsyncMeteringClient::new(config(&server)).unwrap();
    let resp = client
        .track(NewEvent::new("api_calls", "cus_ABC", 1.0))
        .await
        .unwrap();
    assert_eq!(resp.accepted, 1);

    let bodies = ingested_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(
        bodies[0]["events"][0]["idempotencyKey"],
        bodies[1]["events"][0]["idempotencyKey"]
    );
}

#[tokio::test]
async fn unreachable_service_reports_status_zero() {
    let config = ClientConfig::new("http://127.0.0.1:1", "tenant_123")
        .with_request_timeout(Duration::from_secs(1))
        .with_retry_delays(Duration::from_millis(10), Duration::from_millis(50));

    let client = AsyncMeteringClient::new(config).unwrap();
    let err = client
        .track(NewEvent::new("api_calls", "cus_ABC", 1.0))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Transport(_)));
    assert_eq!(err.status_code(), 0);
}

#[tokio::test]
async fn slow_response_times_out_as_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/events/ingest"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accepted": 1, "duplicates": 0 }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = AsyncMeteringClient::new(
        config(&server)
            .with_request_timeout(Duration::from_millis(100))
            .with_max_retry_attempts(1),
    )
    .unwrap();
    let err = client
        .track(NewEvent::new("api_calls", "cus_ABC", 1.0))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 0);
}

#[tokio::test]
async fn get_usage_queries_current_period() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/usage/current"))
        .and(query_param("tenantId", "tenant_123"))
        .and(query_param("customerRef", "cus_ABC"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "customerRef": "cus_ABC",
            "period": { "start": "2024-05-01", "end": "2024-05-31" },
            "metrics": [
                { "name": "api_calls", "current": 1200.0, "limit": 1000.0, "unit": "calls" }
            ],
            "alerts": [
                { "type": "limit", "message": "api_calls over limit", "severity": "critical" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = AsyncMeteringClient::new(config(&server)).unwrap();
    let usage = client.get_usage("cus_ABC").await.unwrap();

    assert_eq!(usage.customer_ref, "cus_ABC");
    assert_eq!(usage.period.start, "2024-05-01");
    assert_eq!(usage.metrics[0].name, "api_calls");
    assert_eq!(usage.metrics[0].limit, Some(1000.0));
    assert_eq!(usage.alerts[0].kind, "limit");
}

#[tokio::test]
async fn get_projection_posts_period_bounds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/usage/projection"))
        .and(body_partial_json(json!({
            "tenantId": "tenant_123",
            "customerRef": "cus_ABC",
            "periodStart": "2024-05-01",
            "periodEnd": "2024-05-31"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "customerRef": "cus_ABC",
            "periodStart": "2024-05-01",
            "periodEnd": "2024-05-31",
            "lineItems": [
                { "metric": "api_calls", "quantity": 1200.0, "unitPrice": 0.01, "total": 12.0 }
            ],
            "subtotal": 12.0,
            "credits": 2.0,
            "total": 10.0,
            "currency": "USD",
            "freshness": { "lastUpdate": "2024-05-15T10:00:00Z", "staleness": 30 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = AsyncMeteringClient::new(config(&server)).unwrap();
    let projection = client
        .get_projection("cus_ABC", Some("2024-05-01"), Some("2024-05-31"))
        .await
        .unwrap();

    assert_eq!(projection.line_items.len(), 1);
    assert!((projection.total - 10.0).abs() < f64::EPSILON);
    assert_eq!(projection.currency, "USD");
    assert_eq!(projection.freshness.staleness, 30);
}

#[tokio::test]
async fn buffered_events_go_out_in_batches() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/events/ingest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accepted": 3,
            "duplicates": 0
        })))
        .mount(&server)
        .await;

    let client = AsyncMeteringClient::new(
        config(&server)
            .with_batch_size(3)
            .with_flush_delay(Duration::from_millis(100)),
    )
    .unwrap();

    for i in 0..4 {
        client
            .buffer(NewEvent::new("api_calls", format!("cus_{i}"), 1.0))
            .await
            .unwrap();
    }

    // The third event filled the batch and flushed inline.
    let bodies = ingested_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["events"].as_array().unwrap().len(), 3);
    assert_eq!(client.buffered_len().await, 1);

    // The fourth goes out once the flush delay passes.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let bodies = ingested_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[1]["events"].as_array().unwrap().len(), 1);
    assert_eq!(client.buffered_len().await, 0);
}

#[test]
fn blocking_client_tracks_and_closes() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/events/ingest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accepted": 1,
                "duplicates": 0
            })))
            .expect(2)
            .mount(&server)
            .await;
        server
    });

    let client = MeteringClient::new(config(&server)).unwrap();

    let resp = client.track(NewEvent::new("api_calls", "cus_ABC", 5.0)).unwrap();
    assert_eq!(resp.accepted, 1);

    client.buffer(NewEvent::new("api_calls", "cus_ABC", 1.0)).unwrap();
    assert_eq!(client.buffered_len(), 1);
    let flushed = client.close().unwrap();
    assert!(flushed.is_some());
    assert_eq!(client.buffered_len(), 0);

    assert!(matches!(
        client.buffer(NewEvent::new("api_calls", "cus_ABC", 1.0)),
        Err(ClientError::Closed)
    ));

    drop(client);
    runtime.block_on(server.verify());
}
