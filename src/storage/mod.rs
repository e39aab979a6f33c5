//! In-memory telemetry storage engine
//!
//! ## Architecture
//!
//! ```text
//! producer ──record()──▶ SignalStore (ring buffer + service index)
//!                              │ append visible
//!                              ▼
//!                        ActivityCache (counters, generation++)
//!                              │ try_send(()) per subscriber
//!                              ▼
//!                        subscribers ──get_range(cursor, pos-1)──▶ SignalStore
//! ```
//!
//! Each signal kind has its own store and lock, so ingestion of one kind never
//! waits on another. Subscribers only receive "something changed" pings; the
//! payload is always pulled from the stores by position.

pub mod activity;
pub mod query;
pub mod record;
pub mod ring_buffer;
pub mod signal_store;

pub use activity::{ActivityCache, ActivitySnapshot, Subscription};
pub use query::{Filter, Filterable, QueryEngine, QueryResult, TraceView};
pub use record::{
    LogEntry, MetricPoint, MetricType, Record, ServiceScoped, SignalKind, Span, SpanStatus,
};
pub use ring_buffer::{Position, RingBuffer};
pub use signal_store::{SignalStore, StoreStats};

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::metrics;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Status snapshot: activity counters plus per-store retention
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    #[serde(flatten)]
    pub activity: ActivitySnapshot,
    pub traces: StoreStats,
    pub logs: StoreStats,
    pub metrics: StoreStats,
}

/// Facade over the three signal stores, the activity cache and the query engine
pub struct ObservabilityStorage {
    spans: SignalStore<Span>,
    logs: SignalStore<LogEntry>,
    metrics: SignalStore<MetricPoint>,
    activity: Arc<ActivityCache>,
    engine: QueryEngine,
}

impl ObservabilityStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self::with_activity(config, Arc::new(ActivityCache::new(config.subscriber_buffer)))
    }

    /// Build storage around an existing activity cache
    pub fn with_activity(config: &StorageConfig, activity: Arc<ActivityCache>) -> Self {
        tracing::info!(
            trace_capacity = config.trace_capacity,
            log_capacity = config.log_capacity,
            metric_capacity = config.metric_capacity,
            "Telemetry storage initialized"
        );

        Self {
            spans: SignalStore::new(SignalKind::Traces, config.trace_capacity),
            logs: SignalStore::new(SignalKind::Logs, config.log_capacity),
            metrics: SignalStore::new(SignalKind::Metrics, config.metric_capacity),
            activity,
            engine: QueryEngine::new(config.default_query_limit, config.max_query_limit),
        }
    }

    /// Ingest one record and return its position within its store
    ///
    /// The append is published before the generation bump, so a subscriber
    /// woken by this record will find it with `get_range`.
    pub fn record(&self, record: Record) -> Position {
        let kind = record.kind();
        let position = match record {
            Record::Span(span) => self.spans.record(span),
            Record::Log(log) => self.logs.record(log),
            Record::Metric(point) => self.metrics.record(point),
        };

        self.activity.record_accepted(kind);
        metrics::record_ingested(kind);
        position
    }

    pub fn record_span(&self, span: Span) -> Position {
        self.record(Record::Span(span))
    }

    pub fn record_log(&self, log: LogEntry) -> Position {
        self.record(Record::Log(log))
    }

    pub fn record_metric(&self, point: MetricPoint) -> Position {
        self.record(Record::Metric(point))
    }

    /// Distinct service names across all stores
    pub fn services(&self) -> BTreeSet<String> {
        let mut services = self.spans.services();
        services.extend(self.logs.services());
        services.extend(self.metrics.services());
        services
    }

    pub fn query(&self, filter: &Filter) -> Result<QueryResult, StorageError> {
        self.engine
            .query(&self.spans, &self.logs, &self.metrics, filter)
    }

    pub fn query_spans(&self, filter: &Filter) -> Result<Vec<Span>, StorageError> {
        self.engine.query_store(&self.spans, filter)
    }

    pub fn query_logs(&self, filter: &Filter) -> Result<Vec<LogEntry>, StorageError> {
        self.engine.query_store(&self.logs, filter)
    }

    pub fn query_metrics(&self, filter: &Filter) -> Result<Vec<MetricPoint>, StorageError> {
        self.engine.query_store(&self.metrics, filter)
    }

    pub fn trace(&self, trace_id: &str) -> Option<TraceView> {
        self.engine.trace(&self.spans, &self.logs, trace_id)
    }

    pub fn spans(&self) -> &SignalStore<Span> {
        &self.spans
    }

    pub fn logs(&self) -> &SignalStore<LogEntry> {
        &self.logs
    }

    pub fn metrics(&self) -> &SignalStore<MetricPoint> {
        &self.metrics
    }

    pub fn current_position(&self, kind: SignalKind) -> Position {
        match kind {
            SignalKind::Traces => self.spans.current_position(),
            SignalKind::Logs => self.logs.current_position(),
            SignalKind::Metrics => self.metrics.current_position(),
        }
    }

    pub fn activity(&self) -> &Arc<ActivityCache> {
        &self.activity
    }

    pub fn subscribe(&self) -> Subscription {
        self.activity.subscribe()
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            activity: self.activity.snapshot(),
            traces: self.spans.stats(),
            logs: self.logs.stats(),
            metrics: self.metrics.stats(),
        }
    }
}

impl Default for ObservabilityStorage {
    fn default() -> Self {
        Self::new(&StorageConfig::default())
    }
}
