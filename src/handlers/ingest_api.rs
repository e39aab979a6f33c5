//! Ingestion HTTP API handlers
//!
//! Each endpoint takes a JSON array of already-decoded records. A batch is
//! validated as a whole before anything is stored.

use super::AppState;
use crate::error::AppError;
use crate::storage::record::current_nanos;
use crate::storage::{LogEntry, MetricPoint, Position, Record, ServiceScoped, Span};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,

    /// Position of the last accepted record in its store
    pub last_position: Option<Position>,
}

fn require_service<T: ServiceScoped>(records: &[T]) -> Result<(), AppError> {
    match records.iter().position(|r| r.service_name().is_empty()) {
        Some(index) => Err(AppError::BadRequest(format!(
            "record {} has an empty service_name",
            index
        ))),
        None => Ok(()),
    }
}

fn ingest<T: Into<Record>>(
    state: &AppState,
    records: Vec<T>,
) -> (StatusCode, Json<IngestResponse>) {
    let accepted = records.len();
    let last_position = records
        .into_iter()
        .map(|record| state.storage.record(record.into()))
        .last();

    tracing::debug!(accepted, "Ingested batch");
    (
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            accepted,
            last_position,
        }),
    )
}

/// POST /api/v1/spans
pub async fn post_spans(
    State(state): State<AppState>,
    Json(spans): Json<Vec<Span>>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    require_service(&spans)?;
    if let Some(index) = spans
        .iter()
        .position(|s| s.trace_id.is_empty() || s.span_id.is_empty())
    {
        return Err(AppError::BadRequest(format!(
            "span {} is missing trace_id or span_id",
            index
        )));
    }

    Ok(ingest(&state, spans))
}

/// POST /api/v1/logs
pub async fn post_logs(
    State(state): State<AppState>,
    Json(mut logs): Json<Vec<LogEntry>>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    require_service(&logs)?;

    let now = current_nanos();
    for log in logs.iter_mut().filter(|l| l.timestamp_unix_nano == 0) {
        log.timestamp_unix_nano = now;
    }

    Ok(ingest(&state, logs))
}

/// POST /api/v1/metrics
pub async fn post_metrics(
    State(state): State<AppState>,
    Json(mut points): Json<Vec<MetricPoint>>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    require_service(&points)?;
    if let Some(index) = points.iter().position(|p| p.name.is_empty()) {
        return Err(AppError::BadRequest(format!(
            "metric point {} has an empty name",
            index
        )));
    }

    let now = current_nanos();
    for point in points.iter_mut().filter(|p| p.timestamp_unix_nano == 0) {
        point.timestamp_unix_nano = now;
    }

    Ok(ingest(&state, points))
}
