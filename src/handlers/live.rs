//! Server-Sent Events live feed
//!
//! `GET /api/v1/live?service=cart&backfill=20` attaches a [`LiveFeed`]. The
//! first event (`attached`) names the feed's subscriber id; each non-empty
//! delta follows as a `delta` event. Keep-alive comments are sent on the
//! configured interval.
//!
//! A feed attached with `paused=true` stays frozen until
//! `POST /api/v1/live/{id}/resume`.

use super::{ApiPath, ApiQuery, AppState};
use crate::error::AppError;
use crate::live_feed::{Backfill, Delta, LiveFeed};
use crate::storage::{Filter, SignalKind};
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Json;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;

const DELTA_CHANNEL_CAPACITY: usize = 16;

/// Query parameters for the live feed
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LiveParams {
    pub kind: Option<SignalKind>,
    pub service: Option<String>,
    pub severity: Option<String>,
    pub span_name: Option<String>,
    pub trace_id: Option<String>,
    pub span_status: Option<String>,
    pub metric_name: Option<String>,
    pub errors_only: bool,

    /// Overrides the configured per-kind backfill windows
    pub backfill: Option<usize>,

    /// Attach frozen; nothing is delivered until the feed is resumed
    pub paused: bool,
}

impl LiveParams {
    fn filter(&self) -> Filter {
        Filter {
            kind: self.kind,
            service: self.service.clone(),
            severity: self.severity.clone(),
            span_name: self.span_name.clone(),
            trace_id: self.trace_id.clone(),
            span_status: self.span_status.clone(),
            metric_name: self.metric_name.clone(),
            errors_only: self.errors_only,
            limit: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedStatus {
    pub subscriber_id: u64,
    pub paused: bool,
}

fn json_event<T: Serialize>(name: &str, data: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(data)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

fn delta_event(delta: &Delta) -> Event {
    json_event("delta", delta).id(delta.generation.to_string())
}

/// GET /api/v1/live
pub async fn live(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<LiveParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let backfill = params
        .backfill
        .map(Backfill::uniform)
        .unwrap_or_else(|| Backfill::from(&state.stream));

    let feed = LiveFeed::new(state.storage.clone(), params.filter(), backfill)?;
    let subscriber_id = feed.subscriber_id();
    let pause = feed.pause_handle();
    if params.paused {
        pause.pause();
    }
    let registration = state.feeds.register(subscriber_id, pause);

    let keepalive = Duration::from_secs(state.stream.keepalive_seconds);
    let (tx, rx) = mpsc::channel(DELTA_CHANNEL_CAPACITY);
    let shutdown = state.shutdown.subscribe();
    tokio::spawn(async move {
        feed.run(tx, shutdown, keepalive).await;
        drop(registration);
    });

    let attached = json_event(
        "attached",
        &FeedStatus {
            subscriber_id,
            paused: params.paused,
        },
    );

    // Ends when the feed task drops its sender
    let deltas = stream::unfold(rx, |mut rx| async move {
        let delta = rx.recv().await?;
        Some((Ok::<_, Infallible>(delta_event(&delta)), rx))
    });
    let events = stream::once(async move { Ok::<_, Infallible>(attached) }).chain(deltas);

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(keepalive)))
}

fn set_paused(
    state: &AppState,
    subscriber_id: u64,
    paused: bool,
) -> Result<Json<FeedStatus>, AppError> {
    let handle = state
        .feeds
        .get(subscriber_id)
        .ok_or_else(|| AppError::NotFound(format!("live feed {} is not attached", subscriber_id)))?;

    if paused {
        handle.pause();
    } else {
        handle.resume();
    }
    tracing::info!(subscriber_id, paused, "Live feed pause state changed");

    Ok(Json(FeedStatus {
        subscriber_id,
        paused,
    }))
}

/// POST /api/v1/live/{subscriber_id}/pause
pub async fn pause_feed(
    State(state): State<AppState>,
    ApiPath(subscriber_id): ApiPath<u64>,
) -> Result<Json<FeedStatus>, AppError> {
    set_paused(&state, subscriber_id, true)
}

/// POST /api/v1/live/{subscriber_id}/resume
pub async fn resume_feed(
    State(state): State<AppState>,
    ApiPath(subscriber_id): ApiPath<u64>,
) -> Result<Json<FeedStatus>, AppError> {
    set_paused(&state, subscriber_id, false)
}
