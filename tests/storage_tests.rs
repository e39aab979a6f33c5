/// Integration tests for the storage engine: retention, delta reads,
/// change notification and filtering under concurrency
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use telemetry_hub::{
    config::StorageConfig,
    storage::{
        Filter, LogEntry, MetricPoint, MetricType, ObservabilityStorage, SignalKind, Span,
        SpanStatus,
    },
};

fn storage_with_capacity(capacity: usize) -> Arc<ObservabilityStorage> {
    Arc::new(ObservabilityStorage::new(&StorageConfig {
        trace_capacity: capacity,
        log_capacity: capacity,
        metric_capacity: capacity,
        ..Default::default()
    }))
}

fn span(service: &str, trace_id: &str, n: u64, status: SpanStatus) -> Span {
    Span {
        trace_id: trace_id.to_string(),
        span_id: format!("{}-{}", service, n),
        parent_span_id: None,
        name: format!("op-{}", n % 3),
        service_name: service.to_string(),
        start_time_unix_nano: n,
        duration_nanos: 10,
        status,
        status_message: None,
        attributes: HashMap::new(),
    }
}

fn log(service: &str, severity: &str, n: u64) -> LogEntry {
    LogEntry {
        timestamp_unix_nano: n,
        service_name: service.to_string(),
        severity: severity.to_string(),
        body: format!("line {}", n),
        trace_id: None,
        span_id: None,
        attributes: HashMap::new(),
    }
}

fn gauge(service: &str, name: &str, value: f64) -> MetricPoint {
    MetricPoint {
        timestamp_unix_nano: 1,
        service_name: service.to_string(),
        name: name.to_string(),
        metric_type: MetricType::Gauge,
        value,
        attributes: HashMap::new(),
    }
}

#[test]
fn test_positions_are_contiguous_per_kind() {
    let storage = storage_with_capacity(100);

    assert_eq!(storage.record_span(span("a", "t", 0, SpanStatus::Ok)), 0);
    assert_eq!(storage.record_log(log("a", "INFO", 0)), 0);
    assert_eq!(storage.record_span(span("a", "t", 1, SpanStatus::Ok)), 1);
    assert_eq!(storage.record_metric(gauge("a", "cpu", 0.5)), 0);

    assert_eq!(storage.current_position(SignalKind::Traces), 2);
    assert_eq!(storage.current_position(SignalKind::Logs), 1);
    assert_eq!(storage.current_position(SignalKind::Metrics), 1);
    assert_eq!(storage.activity().generation(), 4);
}

#[test]
fn test_bounded_retention_keeps_newest() {
    let storage = storage_with_capacity(3);
    for n in 0..10 {
        storage.record_log(log("svc", "INFO", n));
    }

    let logs = storage.logs();
    assert_eq!(logs.buffer().len(), 3);
    assert_eq!(logs.current_position(), 10);

    let bodies: Vec<_> = logs.get_range(0, 9).into_iter().map(|l| l.body).collect();
    assert_eq!(bodies, vec!["line 7", "line 8", "line 9"]);

    let status = storage.status();
    assert_eq!(status.logs.retained, 3);
    assert_eq!(status.logs.evicted, 7);
}

#[test]
fn test_no_loss_delta_streaming_with_concurrent_producer() {
    const TOTAL: u64 = 5_000;
    let storage = storage_with_capacity(TOTAL as usize);

    let producer = {
        let storage = storage.clone();
        thread::spawn(move || {
            for n in 0..TOTAL {
                storage.record_span(span("p", "t", n, SpanStatus::Unset));
            }
        })
    };

    let mut cursor = 0;
    let mut seen = Vec::with_capacity(TOTAL as usize);
    while seen.len() < TOTAL as usize {
        let head = storage.spans().current_position();
        if head > cursor {
            seen.extend(
                storage
                    .spans()
                    .get_range(cursor, head - 1)
                    .into_iter()
                    .map(|s| s.start_time_unix_nano),
            );
            cursor = head;
        } else {
            thread::yield_now();
        }
    }
    producer.join().unwrap();

    let expected: Vec<u64> = (0..TOTAL).collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_concurrent_producers_fill_positions_after_existing_records() {
    let storage = storage_with_capacity(64);
    for n in 0..130 {
        storage.record_log(log("warmup", "INFO", n));
    }
    let start = storage.current_position(SignalKind::Logs);
    assert_eq!(start, 130);

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let storage = storage.clone();
            thread::spawn(move || {
                (0..300)
                    .map(|n| storage.record_log(log(&format!("p-{}", p), "INFO", n)))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut positions: Vec<u64> = producers
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    positions.sort_unstable();

    let expected: Vec<u64> = (start..start + 1_200).collect();
    assert_eq!(positions, expected);
    assert_eq!(storage.current_position(SignalKind::Logs), start + 1_200);
    assert_eq!(storage.activity().generation(), 1_330);
}

#[test]
fn test_generation_never_runs_ahead_of_visible_records() {
    let storage = storage_with_capacity(100_000);

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let storage = storage.clone();
            thread::spawn(move || {
                for n in 0..2_000 {
                    storage.record_span(span(&format!("svc-{}", p), "t", n, SpanStatus::Ok));
                }
            })
        })
        .collect();

    // Only spans are recorded, so every counted generation has a visible span
    while producers.iter().any(|h| !h.is_finished()) {
        let generation = storage.activity().generation();
        let visible = storage.spans().current_position();
        assert!(
            visible >= generation,
            "generation {} observed before {} records were visible",
            generation,
            visible
        );
    }

    for handle in producers {
        handle.join().unwrap();
    }
    assert_eq!(storage.activity().generation(), 8_000);
    assert_eq!(storage.services().len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_woken_subscriber_sees_the_record() {
    let storage = storage_with_capacity(10_000);
    let mut subscription = storage.subscribe();

    let producer = {
        let storage = storage.clone();
        tokio::task::spawn_blocking(move || {
            for n in 0..1_000 {
                storage.record_log(log("w", "INFO", n));
            }
        })
    };

    let mut cursor = 0;
    let mut received = 0;
    while received < 1_000 {
        assert!(subscription.changed().await);
        let head = storage.logs().current_position();
        // A ping is only sent once at least one append is visible
        assert!(head > 0);
        if head > cursor {
            received += storage.logs().get_range(cursor, head - 1).len();
            cursor = head;
        }
    }
    producer.await.unwrap();
    assert_eq!(received, 1_000);
}

#[test]
fn test_filter_correctness_across_stores() {
    let storage = storage_with_capacity(100);
    storage.record_span(span("cart", "t1", 0, SpanStatus::Ok));
    storage.record_span(span("cart", "t1", 1, SpanStatus::Error));
    storage.record_span(span("api", "t2", 2, SpanStatus::Error));
    storage.record_log(log("cart", "ERROR", 3));
    storage.record_log(log("cart", "INFO", 4));
    storage.record_metric(gauge("cart", "queue_depth", 3.0));
    storage.record_metric(gauge("api", "queue_depth", 1.0));

    // service applies to every store
    let cart = storage.query(&Filter::for_service("cart")).unwrap();
    assert_eq!(cart.spans.len(), 2);
    assert_eq!(cart.logs.len(), 2);
    assert_eq!(cart.metrics.len(), 1);

    // errors_only is span-only
    let errors = storage.query(&Filter::default().errors_only()).unwrap();
    let ids: Vec<_> = errors.spans.iter().map(|s| s.span_id.as_str()).collect();
    assert_eq!(ids, vec!["api-2", "cart-1"]);
    assert!(errors.logs.is_empty());
    assert!(errors.metrics.is_empty());

    // severity is log-only
    let severe = storage
        .query(&Filter {
            severity: Some("ERROR".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert!(severe.spans.is_empty());
    assert_eq!(severe.logs.len(), 1);

    // kind restricts to one store
    let metrics_only = storage
        .query(&Filter {
            kind: Some(SignalKind::Metrics),
            metric_name: Some("queue_depth".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(metrics_only.metrics.len(), 2);
    assert_eq!(metrics_only.len(), 2);

    // unknown service matches nothing, but is not an error
    assert!(storage.query(&Filter::for_service("ghost")).unwrap().is_empty());
}

#[test]
fn test_limit_keeps_newest_per_store_and_rejects_zero() {
    let storage = storage_with_capacity(100);
    for n in 0..10 {
        storage.record_span(span("a", "t", n, SpanStatus::Ok));
        storage.record_log(log("a", "INFO", n));
    }

    let result = storage.query(&Filter::default().with_limit(3)).unwrap();
    let starts: Vec<_> = result.spans.iter().map(|s| s.start_time_unix_nano).collect();
    assert_eq!(starts, vec![9, 8, 7]);
    assert_eq!(result.logs.len(), 3);

    assert!(storage.query(&Filter::default().with_limit(0)).is_err());
    assert!(storage.query(&Filter::default().with_limit(-5)).is_err());
}

#[test]
fn test_trace_view_collects_spans_and_logs() {
    let storage = storage_with_capacity(100);
    let mut root = span("gateway", "trace-1", 100, SpanStatus::Ok);
    root.duration_nanos = 500;
    let mut child = span("db", "trace-1", 50, SpanStatus::Error);
    child.parent_span_id = Some(root.span_id.clone());
    child.start_time_unix_nano = 200;

    storage.record_span(child);
    storage.record_span(root);
    storage.record_span(span("other", "trace-2", 1, SpanStatus::Ok));

    let mut correlated = log("db", "ERROR", 1);
    correlated.trace_id = Some("trace-1".to_string());
    storage.record_log(correlated);

    let view = storage.trace("trace-1").unwrap();
    assert_eq!(view.spans.len(), 2);
    assert_eq!(view.spans[0].service_name, "gateway");
    assert_eq!(view.root_span_id.as_deref(), Some("gateway-100"));
    assert_eq!(view.duration_nanos, 500);
    assert!(view.has_errors);
    assert_eq!(view.logs.len(), 1);
    assert_eq!(view.services.len(), 2);

    assert!(storage.trace("missing").is_none());
}
