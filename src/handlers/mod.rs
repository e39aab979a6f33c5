//! HTTP handlers
//!
//! - ingest_api: record ingestion
//! - query_api: snapshot queries, traces, services and status
//! - live: Server-Sent Events live feed
//! - health: liveness check
//! - metrics_handler: Prometheus exposition

pub mod health;
pub mod ingest_api;
pub mod live;
pub mod metrics_handler;
pub mod query_api;

use crate::config::StreamConfig;
use crate::error::AppError;
use crate::live_feed::FeedRegistry;
use crate::signals::ShutdownSignal;
use crate::storage::ObservabilityStorage;
use axum::extract::FromRequestParts;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shared state for the telemetry API
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<ObservabilityStorage>,
    pub stream: StreamConfig,
    pub shutdown: broadcast::Sender<ShutdownSignal>,
    pub feeds: FeedRegistry,
}

impl AppState {
    pub fn new(
        storage: Arc<ObservabilityStorage>,
        stream: StreamConfig,
        shutdown: broadcast::Sender<ShutdownSignal>,
    ) -> Self {
        Self {
            storage,
            stream,
            shutdown,
            feeds: FeedRegistry::default(),
        }
    }
}

/// `Query` extractor whose rejection is a JSON [`AppError`]
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// `Path` extractor whose rejection is a JSON [`AppError`]
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);
