/// Integration tests for the HTTP surface, driven through the router with
/// `tower::ServiceExt::oneshot`
use axum::{
    body::{Body, BodyDataStream},
    http::{Request, StatusCode},
    Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use telemetry_hub::{
    config::{MetricsConfig, StorageConfig, StreamConfig},
    handlers::AppState,
    server::create_router,
    signals::shutdown_channel,
    storage::ObservabilityStorage,
};
use tower::ServiceExt;

fn test_app() -> (Router, Arc<ObservabilityStorage>) {
    let storage = Arc::new(ObservabilityStorage::new(&StorageConfig {
        trace_capacity: 100,
        log_capacity: 100,
        metric_capacity: 100,
        ..Default::default()
    }));
    let state = AppState::new(storage.clone(), StreamConfig::default(), shutdown_channel());

    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
    let app = create_router(
        state,
        &MetricsConfig::default(),
        Some(Arc::new(recorder.handle())),
    );
    (app, storage)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Value of an SSE field (`event`, `data`, ..) in one frame
fn sse_field<'a>(frame: &'a str, name: &str) -> Option<&'a str> {
    frame
        .lines()
        .find_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
        .map(str::trim_start)
}

/// Read frames until one carries the named event
async fn next_event(body: &mut BodyDataStream, event: &str) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .expect("no event within timeout")
            .expect("stream ended")
            .unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();
        if sse_field(&text, "event") == Some(event) {
            return text;
        }
    }
}

fn spans_payload() -> Value {
    json!([
        {"trace_id": "t1", "span_id": "s1", "name": "GET /cart", "service_name": "a",
         "start_time_unix_nano": 1, "duration_nanos": 100, "status": "OK"},
        {"trace_id": "t1", "span_id": "s2", "parent_span_id": "s1", "name": "SELECT",
         "service_name": "a", "start_time_unix_nano": 10, "duration_nanos": 20, "status": "ERROR"},
        {"trace_id": "t2", "span_id": "s3", "name": "GET /", "service_name": "a",
         "start_time_unix_nano": 20},
        {"trace_id": "t3", "span_id": "s4", "name": "GET /", "service_name": "b",
         "start_time_unix_nano": 30},
        {"trace_id": "t3", "span_id": "s5", "name": "POST /", "service_name": "b",
         "start_time_unix_nano": 40}
    ])
}

#[tokio::test]
async fn test_ingest_then_query_by_service() {
    let (app, storage) = test_app();

    let (status, body) = send(&app, post_json("/api/v1/spans", spans_payload())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], 5);
    assert_eq!(body["last_position"], 4);
    assert_eq!(storage.spans().current_position(), 5);

    let (status, body) = send(&app, get("/api/v1/spans?service=b")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["spans"][0]["span_id"], "s5");
    assert_eq!(body["spans"][1]["span_id"], "s4");

    let (_, body) = send(&app, get("/api/v1/services")).await;
    assert_eq!(body["services"], json!(["a", "b"]));
}

#[tokio::test]
async fn test_combined_query_with_errors_only() {
    let (app, _) = test_app();
    send(&app, post_json("/api/v1/spans", spans_payload())).await;
    send(
        &app,
        post_json(
            "/api/v1/logs",
            json!([{"timestamp_unix_nano": 5, "service_name": "a", "severity": "ERROR",
                    "body": "boom", "trace_id": "t1"}]),
        ),
    )
    .await;

    let (status, body) = send(&app, get("/api/v1/query?errors_only=true")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["spans"][0]["span_id"], "s2");
    assert_eq!(body["logs"], json!([]));

    let (_, body) = send(&app, get("/api/v1/query?kind=logs&severity=ERROR")).await;
    assert_eq!(body["logs"][0]["body"], "boom");
}

#[tokio::test]
async fn test_invalid_limit_is_bad_request() {
    let (app, _) = test_app();

    let (status, body) = send(&app, get("/api/v1/query?limit=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_filter");

    let (status, _) = send(&app, get("/api/v1/logs?limit=-1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_trace_lookup() {
    let (app, _) = test_app();
    send(&app, post_json("/api/v1/spans", spans_payload())).await;

    let (status, body) = send(&app, get("/api/v1/traces/t1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["root_span_id"], "s1");
    assert_eq!(body["has_errors"], true);
    assert_eq!(body["spans"].as_array().unwrap().len(), 2);

    let (status, body) = send(&app, get("/api/v1/traces/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");
}

#[tokio::test]
async fn test_ingest_rejects_empty_service_name() {
    let (app, storage) = test_app();

    let payload = json!([
        {"timestamp_unix_nano": 1, "service_name": "ok", "name": "cpu",
         "metric_type": "GAUGE", "value": 0.5},
        {"timestamp_unix_nano": 2, "service_name": "", "name": "cpu",
         "metric_type": "GAUGE", "value": 0.7}
    ]);
    let (status, body) = send(&app, post_json("/api/v1/metrics", payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "bad_request");

    // Whole batch rejected
    assert_eq!(storage.metrics().current_position(), 0);
}

#[tokio::test]
async fn test_unstamped_log_gets_receive_time() {
    let (app, storage) = test_app();

    let payload = json!([{"service_name": "cart", "severity": "INFO", "body": "hi"}]);
    let (status, _) = send(&app, post_json("/api/v1/logs", payload)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let logs = storage.logs().get_range(0, 0);
    assert!(logs[0].timestamp_unix_nano > 0);
}

#[tokio::test]
async fn test_status_health_and_metrics() {
    let (app, _) = test_app();
    send(&app, post_json("/api/v1/spans", spans_payload())).await;

    let (status, body) = send(&app, get("/api/v1/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generation"], 5);
    assert_eq!(body["spans_received"], 5);
    assert_eq!(body["traces"]["current_position"], 5);
    assert_eq!(body["logs"]["capacity"], 100);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_live_feed_streams_backfill_as_sse() {
    let (app, _) = test_app();
    send(&app, post_json("/api/v1/spans", spans_payload())).await;

    let response = app
        .clone()
        .oneshot(get("/api/v1/live?service=b&backfill=10"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let mut body = response.into_body().into_data_stream();
    let attached = next_event(&mut body, "attached").await;
    let status: Value = serde_json::from_str(sse_field(&attached, "data").unwrap()).unwrap();
    assert_eq!(status["paused"], false);

    let text = next_event(&mut body, "delta").await;
    assert!(text.contains("\"s4\""));
    assert!(!text.contains("\"s1\""));
}

#[tokio::test]
async fn test_live_feed_rejects_bad_kind() {
    let (app, _) = test_app();
    let response = app
        .clone()
        .oneshot(get("/api/v1/live?kind=profiles"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unparseable_query_is_json_bad_request() {
    let (app, _) = test_app();

    let (status, body) = send(&app, get("/api/v1/spans?limit=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "bad_request");

    let (status, body) = send(&app, get("/api/v1/query?kind=profiles")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "bad_request");

    let (status, body) = send(&app, post_json("/api/v1/live/abc/resume", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "bad_request");
}

#[tokio::test]
async fn test_paused_live_feed_resumes_with_frozen_backlog() {
    let (app, storage) = test_app();
    send(
        &app,
        post_json(
            "/api/v1/logs",
            json!([{"timestamp_unix_nano": 1, "service_name": "cart", "severity": "INFO", "body": "before"}]),
        ),
    )
    .await;

    let response = app
        .clone()
        .oneshot(get("/api/v1/live?kind=logs&backfill=0&paused=true"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body().into_data_stream();

    let attached = next_event(&mut body, "attached").await;
    let status: Value = serde_json::from_str(sse_field(&attached, "data").unwrap()).unwrap();
    assert_eq!(status["paused"], true);
    let id = status["subscriber_id"].as_u64().unwrap();

    let logs = json!([
        {"timestamp_unix_nano": 2, "service_name": "cart", "severity": "INFO", "body": "one"},
        {"timestamp_unix_nano": 3, "service_name": "cart", "severity": "INFO", "body": "two"},
        {"timestamp_unix_nano": 4, "service_name": "cart", "severity": "INFO", "body": "three"}
    ]);
    let (status, _) = send(&app, post_json("/api/v1/logs", logs)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // Frozen: nothing is delivered while paused
    let quiet = tokio::time::timeout(Duration::from_millis(200), body.next()).await;
    assert!(quiet.is_err(), "paused feed delivered a frame");
    assert_eq!(storage.activity().subscriber_count(), 1);

    let (status, resumed) = send(
        &app,
        post_json(&format!("/api/v1/live/{}/resume", id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resumed["paused"], false);

    let delta = next_event(&mut body, "delta").await;
    let data: Value = serde_json::from_str(sse_field(&delta, "data").unwrap()).unwrap();
    let bodies: Vec<_> = data["logs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["body"].as_str().unwrap())
        .collect();
    assert_eq!(bodies, vec!["one", "two", "three"]);

    let (status, body) = send(&app, post_json("/api/v1/live/9999/pause", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");
}
