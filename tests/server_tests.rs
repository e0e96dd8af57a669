//! HTTP sidecar tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use route_prefetch::config::{Config, OriginConfig};
use route_prefetch::prefetch::{PrefetchCoordinator, QueryCache};
use route_prefetch::server::api::{build_router, AppState};
use route_prefetch::server::metrics::PrefetchMetrics;
use route_prefetch::server::origin::SimulatedOrigin;

fn app() -> (Router, Arc<AppState>) {
    let mut config = Config::default();
    config.origin = OriginConfig {
        latency_ms: 5,
        payload_bytes: 64,
    };
    let config = Arc::new(config);

    let cache = Arc::new(QueryCache::new());
    let state = Arc::new(AppState {
        coordinator: PrefetchCoordinator::new(cache.clone(), config.prefetch.clone()),
        cache,
        origin: Arc::new(SimulatedOrigin::new(&config.origin)),
        metrics: PrefetchMetrics::new().unwrap(),
        config,
        start_time: Instant::now(),
    });
    (build_router(state.clone()), state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_prefetch_endpoint_warms_route() {
    let (app, state) = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/prefetch",
        Some(json!({"key": ["users", 1]})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json_body(&body)["keys"][0], r#"["users",1]"#);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(state.coordinator.ledger_len(), 1);
    assert_eq!(state.origin.load_count(), 1);

    // Repeat is deduplicated.
    send(&app, Method::POST, "/v1/prefetch", Some(json!({"key": ["users", 1]}))).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(state.origin.load_count(), 1);

    let (status, body) = send(&app, Method::GET, "/v1/prefetch/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    let stats = json_body(&body);
    assert_eq!(stats["ledger_entries"], 1);
    assert_eq!(stats["pending_fetches"], 0);
    assert_eq!(stats["cached_payloads"], 1);
    assert_eq!(stats["events"]["succeeded"], 1);
    assert_eq!(stats["events"]["deduplicated"], 1);
}

#[tokio::test]
async fn test_empty_key_is_bad_request() {
    let (app, _) = app();
    let (status, body) = send(&app, Method::POST, "/v1/prefetch", Some(json!({"key": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_body(&body)["error"]
        .as_str()
        .unwrap()
        .contains("at least one part"));
}

#[tokio::test(start_paused = true)]
async fn test_batch_and_clear() {
    let (app, state) = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/prefetch/batch",
        Some(json!({"requests": [{"key": ["a"]}, {"key": ["b"]}, {"key": ["c", 1]}]})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json_body(&body)["keys"].as_array().unwrap().len(), 3);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(state.coordinator.ledger_len(), 3);

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/prefetch/clear",
        Some(json!({"key": ["a"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["removed"], 1);

    let (status, body) = send(&app, Method::DELETE, "/v1/prefetch", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["removed"], 2);
    assert_eq!(state.coordinator.ledger_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_delayed_prefetch_via_api() {
    let (app, state) = app();

    send(
        &app,
        Method::POST,
        "/v1/prefetch",
        Some(json!({"key": ["slow"], "delay_ms": 100, "on_hover": true})),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(state.coordinator.pending_timers(), 1);
    assert_eq!(state.origin.load_count(), 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(state.origin.load_count(), 1);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let (app, _) = app();

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let health = json_body(&body);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["disposed"], false);

    let (status, body) = send(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("route_prefetch_events"));
    assert!(text.contains("route_prefetch_ledger_entries"));
    assert!(text.contains("route_prefetch_pending_fetches"));
}
