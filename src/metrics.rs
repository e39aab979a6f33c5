use crate::storage::SignalKind;
use anyhow::Context;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder
///
/// Fails if a recorder is already installed (e.g. a second call in tests).
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    init_metric_descriptions();

    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "telemetry_records_total",
        "Total number of telemetry records accepted"
    );
    describe_counter!(
        "telemetry_evictions_total",
        "Total number of records evicted from full ring buffers"
    );
    describe_counter!(
        "telemetry_notifications_dropped_total",
        "Change notifications collapsed into an already pending one"
    );
    describe_counter!(
        "telemetry_query_errors_total",
        "Total number of rejected queries"
    );
    describe_gauge!("telemetry_subscribers", "Number of live subscriptions");
    describe_histogram!(
        "telemetry_query_duration_seconds",
        "Query scan duration in seconds"
    );
    describe_gauge!(
        "telemetry_hub_info",
        "Telemetry hub version and build information"
    );

    gauge!("telemetry_hub_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record an accepted record
pub fn record_ingested(kind: SignalKind) {
    counter!("telemetry_records_total", "kind" => kind.as_str()).increment(1);
}

/// Record a ring buffer eviction
pub fn record_eviction(kind: SignalKind) {
    counter!("telemetry_evictions_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_notification_dropped() {
    counter!("telemetry_notifications_dropped_total").increment(1);
}

pub fn record_query_error() {
    counter!("telemetry_query_errors_total").increment(1);
}

pub fn set_subscribers(count: usize) {
    gauge!("telemetry_subscribers").set(count as f64);
}

/// Record how long one store scan took
pub fn record_query_duration(kind: SignalKind, duration: Duration) {
    histogram!("telemetry_query_duration_seconds", "kind" => kind.as_str())
        .record(duration.as_secs_f64());
}
