//! Query HTTP API handlers
//!
//! Query-string parameters map one-to-one onto [`Filter`] fields, e.g.
//! `GET /api/v1/spans?service=cart&errors_only=true&limit=20`.

use super::{ApiPath, ApiQuery, AppState};
use crate::error::AppError;
use crate::storage::{Filter, LogEntry, MetricPoint, QueryResult, Span, StatusSnapshot, TraceView};
use axum::extract::State;
use axum::response::Json;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Serialize)]
pub struct SpansResponse {
    pub total: usize,
    pub spans: Vec<Span>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub total: usize,
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub total: usize,
    pub metrics: Vec<MetricPoint>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub total: usize,
    #[serde(flatten)]
    pub result: QueryResult,
}

#[derive(Debug, Serialize)]
pub struct ServicesResponse {
    pub total: usize,
    pub services: BTreeSet<String>,
}

/// GET /api/v1/spans
pub async fn get_spans(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<Filter>,
) -> Result<Json<SpansResponse>, AppError> {
    let spans = state.storage.query_spans(&filter)?;
    Ok(Json(SpansResponse {
        total: spans.len(),
        spans,
    }))
}

/// GET /api/v1/logs
pub async fn get_logs(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<Filter>,
) -> Result<Json<LogsResponse>, AppError> {
    let logs = state.storage.query_logs(&filter)?;
    Ok(Json(LogsResponse {
        total: logs.len(),
        logs,
    }))
}

/// GET /api/v1/metrics
pub async fn get_metrics(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<Filter>,
) -> Result<Json<MetricsResponse>, AppError> {
    let metrics = state.storage.query_metrics(&filter)?;
    Ok(Json(MetricsResponse {
        total: metrics.len(),
        metrics,
    }))
}

/// GET /api/v1/query - combined query over every applicable store
pub async fn query(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<Filter>,
) -> Result<Json<QueryResponse>, AppError> {
    let result = state.storage.query(&filter)?;
    Ok(Json(QueryResponse {
        total: result.len(),
        result,
    }))
}

/// GET /api/v1/traces/{trace_id}
pub async fn get_trace(
    State(state): State<AppState>,
    ApiPath(trace_id): ApiPath<String>,
) -> Result<Json<TraceView>, AppError> {
    state
        .storage
        .trace(&trace_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("trace {} is not retained", trace_id)))
}

/// GET /api/v1/services
pub async fn get_services(State(state): State<AppState>) -> Json<ServicesResponse> {
    let services = state.storage.services();
    Json(ServicesResponse {
        total: services.len(),
        services,
    })
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.storage.status())
}
