//! Filter-predicate query engine
//!
//! Queries scan the relevant stores newest-first under a read guard and stop
//! as soon as `limit` matches have been collected, so a limit always keeps the
//! most recent matches.

use super::record::{LogEntry, MetricPoint, ServiceScoped, SignalKind, Span};
use super::signal_store::SignalStore;
use crate::error::StorageError;
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;

/// Query predicates (all ANDed; `None` = unconstrained)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    /// Restrict the query to a single store
    pub kind: Option<SignalKind>,

    pub service: Option<String>,

    /// Log severity text (logs only)
    pub severity: Option<String>,

    /// Span name (spans only)
    pub span_name: Option<String>,

    /// Trace id (spans and trace-correlated logs)
    pub trace_id: Option<String>,

    /// Span status text: UNSET, OK or ERROR (spans only)
    pub span_status: Option<String>,

    /// Metric name (metrics only)
    pub metric_name: Option<String>,

    /// Only spans with error status
    pub errors_only: bool,

    /// Maximum results per store; must be positive when present
    pub limit: Option<i64>,
}

impl Filter {
    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            service: Some(service.into()),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn errors_only(mut self) -> Self {
        self.errors_only = true;
        self
    }

    /// Structural validation; a filter that merely matches nothing is valid
    pub fn validate(&self) -> Result<(), StorageError> {
        if let Some(limit) = self.limit {
            if limit <= 0 {
                return Err(StorageError::InvalidFilter(format!(
                    "limit must be greater than 0, got {}",
                    limit
                )));
            }
        }
        Ok(())
    }

    /// Whether records of `kind` can satisfy this filter at all
    pub fn applies_to(&self, kind: SignalKind) -> bool {
        if self.kind.is_some_and(|k| k != kind) {
            return false;
        }

        let span_only =
            self.span_name.is_some() || self.span_status.is_some() || self.errors_only;

        match kind {
            SignalKind::Traces => self.severity.is_none() && self.metric_name.is_none(),
            SignalKind::Logs => !span_only && self.metric_name.is_none(),
            SignalKind::Metrics => {
                !span_only && self.severity.is_none() && self.trace_id.is_none()
            }
        }
    }

    fn service_matches(&self, service: &str) -> bool {
        self.service.as_deref().map_or(true, |s| s == service)
    }
}

fn eq(predicate: &Option<String>, value: &str) -> bool {
    predicate.as_deref().map_or(true, |p| p == value)
}

/// A record type the query engine can evaluate a [`Filter`] against
pub trait Filterable: ServiceScoped + Clone {
    const KIND: SignalKind;

    /// Kind-specific predicates; the service predicate is checked separately
    fn matches_fields(&self, filter: &Filter) -> bool;

    fn matches(&self, filter: &Filter) -> bool {
        filter.applies_to(Self::KIND)
            && filter.service_matches(self.service_name())
            && self.matches_fields(filter)
    }
}

impl Filterable for Span {
    const KIND: SignalKind = SignalKind::Traces;

    fn matches_fields(&self, filter: &Filter) -> bool {
        eq(&filter.span_name, &self.name)
            && eq(&filter.trace_id, &self.trace_id)
            && eq(&filter.span_status, self.status.as_str())
            && (!filter.errors_only || self.is_error())
    }
}

impl Filterable for LogEntry {
    const KIND: SignalKind = SignalKind::Logs;

    fn matches_fields(&self, filter: &Filter) -> bool {
        eq(&filter.severity, &self.severity)
            && filter
                .trace_id
                .as_deref()
                .map_or(true, |t| self.trace_id.as_deref() == Some(t))
    }
}

impl Filterable for MetricPoint {
    const KIND: SignalKind = SignalKind::Metrics;

    fn matches_fields(&self, filter: &Filter) -> bool {
        eq(&filter.metric_name, &self.name)
    }
}

/// Result of a combined query, each list newest first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub spans: Vec<Span>,
    pub logs: Vec<LogEntry>,
    pub metrics: Vec<MetricPoint>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.spans.len() + self.logs.len() + self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All retained data for one trace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceView {
    pub trace_id: String,

    /// Spans ordered by start time
    pub spans: Vec<Span>,

    /// Correlated logs in acceptance order
    pub logs: Vec<LogEntry>,

    pub services: BTreeSet<String>,
    pub root_span_id: Option<String>,
    pub duration_nanos: u64,
    pub has_errors: bool,
}

/// Evaluates filters over signal stores
#[derive(Debug, Clone)]
pub struct QueryEngine {
    default_limit: usize,
    max_limit: usize,
}

impl QueryEngine {
    pub fn new(default_limit: usize, max_limit: usize) -> Self {
        let max_limit = max_limit.max(1);
        Self {
            default_limit: default_limit.clamp(1, max_limit),
            max_limit,
        }
    }

    /// Effective per-store limit for a validated filter
    fn resolve_limit(&self, filter: &Filter) -> usize {
        match filter.limit {
            Some(limit) => usize::try_from(limit)
                .unwrap_or(self.max_limit)
                .min(self.max_limit),
            None => self.default_limit,
        }
    }

    fn check(&self, filter: &Filter) -> Result<usize, StorageError> {
        filter.validate().inspect_err(|e| {
            metrics::record_query_error();
            tracing::warn!(error = %e, "Rejected query filter");
        })?;
        Ok(self.resolve_limit(filter))
    }

    /// Newest-first matches from a single store
    pub fn query_store<T: Filterable>(
        &self,
        store: &SignalStore<T>,
        filter: &Filter,
    ) -> Result<Vec<T>, StorageError> {
        let limit = self.check(filter)?;
        Ok(self.scan(store, filter, limit))
    }

    fn scan<T: Filterable>(&self, store: &SignalStore<T>, filter: &Filter, limit: usize) -> Vec<T> {
        if !filter.applies_to(T::KIND) {
            return Vec::new();
        }

        // Services never seen by this store cannot match
        if let Some(service) = &filter.service {
            if !store.has_service(service) {
                return Vec::new();
            }
        }

        let start = Instant::now();
        let results = store
            .buffer()
            .find_newest(limit, |record| record.matches(filter));
        metrics::record_query_duration(T::KIND, start.elapsed());

        results
    }

    /// Newest-first matches from every store the filter applies to
    pub fn query(
        &self,
        spans: &SignalStore<Span>,
        logs: &SignalStore<LogEntry>,
        metrics: &SignalStore<MetricPoint>,
        filter: &Filter,
    ) -> Result<QueryResult, StorageError> {
        let limit = self.check(filter)?;

        Ok(QueryResult {
            spans: self.scan(spans, filter, limit),
            logs: self.scan(logs, filter, limit),
            metrics: self.scan(metrics, filter, limit),
        })
    }

    /// Every retained span and log of `trace_id`, or `None` if no span is retained
    pub fn trace(
        &self,
        spans: &SignalStore<Span>,
        logs: &SignalStore<LogEntry>,
        trace_id: &str,
    ) -> Option<TraceView> {
        let mut trace_spans = spans
            .buffer()
            .find_newest(usize::MAX, |span| span.trace_id == trace_id);
        if trace_spans.is_empty() {
            return None;
        }
        trace_spans.sort_by_key(|span| span.start_time_unix_nano);

        let mut trace_logs = logs
            .buffer()
            .find_newest(usize::MAX, |log| log.trace_id.as_deref() == Some(trace_id));
        trace_logs.reverse();

        let start = trace_spans
            .iter()
            .map(|s| s.start_time_unix_nano)
            .min()
            .unwrap_or_default();
        let end = trace_spans
            .iter()
            .map(Span::end_time_unix_nano)
            .max()
            .unwrap_or_default();

        Some(TraceView {
            trace_id: trace_id.to_string(),
            services: trace_spans.iter().map(|s| s.service_name.clone()).collect(),
            root_span_id: trace_spans
                .iter()
                .find(|s| s.parent_span_id.is_none())
                .map(|s| s.span_id.clone()),
            duration_nanos: end.saturating_sub(start),
            has_errors: trace_spans.iter().any(Span::is_error),
            spans: trace_spans,
            logs: trace_logs,
        })
    }
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new(1000, 10_000)
    }
}
