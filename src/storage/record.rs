//! Telemetry record types
//!
//! Already-decoded spans, logs and metric points as handed over by the
//! ingestion layer. Timestamps are Unix nanoseconds.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Signal kind (one ring buffer per kind)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Traces,
    Logs,
    Metrics,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Traces => "traces",
            Self::Logs => "logs",
            Self::Metrics => "metrics",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Span status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "UNSET",
            Self::Ok => "OK",
            Self::Error => "ERROR",
        }
    }
}

/// A finished span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    pub name: String,
    pub service_name: String,
    pub start_time_unix_nano: u64,
    #[serde(default)]
    pub duration_nanos: u64,
    #[serde(default)]
    pub status: SpanStatus,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl Span {
    pub fn is_error(&self) -> bool {
        self.status == SpanStatus::Error
    }

    pub fn end_time_unix_nano(&self) -> u64 {
        self.start_time_unix_nano.saturating_add(self.duration_nanos)
    }
}

/// A single log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Zero when the producer did not stamp it; ingestion fills in receive time
    #[serde(default)]
    pub timestamp_unix_nano: u64,
    pub service_name: String,

    /// Severity text (e.g. "ERROR", "WARN", "INFO"), matched exactly
    pub severity: String,

    pub body: String,

    /// Trace correlation, when the log was emitted inside a span
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,

    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Metric instrument type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricType {
    Gauge,
    Sum,
    Histogram,
}

/// One metric data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    #[serde(default)]
    pub timestamp_unix_nano: u64,
    pub service_name: String,
    pub name: String,
    pub metric_type: MetricType,
    pub value: f64,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// A record of any signal kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "lowercase")]
pub enum Record {
    Span(Span),
    Log(LogEntry),
    Metric(MetricPoint),
}

impl Record {
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::Span(_) => SignalKind::Traces,
            Self::Log(_) => SignalKind::Logs,
            Self::Metric(_) => SignalKind::Metrics,
        }
    }

    pub fn service_name(&self) -> &str {
        match self {
            Self::Span(s) => &s.service_name,
            Self::Log(l) => &l.service_name,
            Self::Metric(m) => &m.service_name,
        }
    }
}

impl From<Span> for Record {
    fn from(span: Span) -> Self {
        Self::Span(span)
    }
}

impl From<LogEntry> for Record {
    fn from(log: LogEntry) -> Self {
        Self::Log(log)
    }
}

impl From<MetricPoint> for Record {
    fn from(point: MetricPoint) -> Self {
        Self::Metric(point)
    }
}

/// Records that carry an owning service name (indexed by SignalStore)
pub trait ServiceScoped {
    fn service_name(&self) -> &str;
}

impl ServiceScoped for Span {
    fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl ServiceScoped for LogEntry {
    fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl ServiceScoped for MetricPoint {
    fn service_name(&self) -> &str {
        &self.service_name
    }
}

/// Get current time as Unix nanoseconds
pub fn current_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
