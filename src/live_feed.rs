//! Per-consumer live delta feed
//!
//! A feed owns a subscription and a private cursor per signal kind. On every
//! change ping (or keepalive tick) it reads `get_range(cursor, current - 1)`
//! from each store whose position moved, applies the consumer's filter and
//! advances the cursor. Pings carry no data, so a collapsed ping only delays
//! delivery until the next read.
//!
//! Pausing freezes the cursors: nothing is emitted and nothing is consumed,
//! so the first poll after resuming delivers everything still retained.

use crate::config::StreamConfig;
use crate::error::StorageError;
use crate::signals::ShutdownSignal;
use crate::storage::{
    Filter, Filterable, LogEntry, MetricPoint, ObservabilityStorage, Position, SignalKind,
    SignalStore, Span, Subscription,
};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, Notify};

/// Number of most recent records per kind shown to a newly attached feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backfill {
    pub traces: usize,
    pub logs: usize,
    pub metrics: usize,
}

impl Backfill {
    pub fn none() -> Self {
        Self::uniform(0)
    }

    pub fn uniform(count: usize) -> Self {
        Self {
            traces: count,
            logs: count,
            metrics: count,
        }
    }

    fn window(&self, kind: SignalKind) -> usize {
        match kind {
            SignalKind::Traces => self.traces,
            SignalKind::Logs => self.logs,
            SignalKind::Metrics => self.metrics,
        }
    }
}

impl From<&StreamConfig> for Backfill {
    fn from(config: &StreamConfig) -> Self {
        Self {
            traces: config.trace_backfill,
            logs: config.log_backfill,
            metrics: config.metric_backfill,
        }
    }
}

/// Next unread position per signal kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedCursor {
    traces: Position,
    logs: Position,
    metrics: Position,
}

impl FeedCursor {
    /// Start `backfill` records behind the current head of each store
    pub fn attach(storage: &ObservabilityStorage, backfill: &Backfill) -> Self {
        let start = |kind| {
            storage
                .current_position(kind)
                .saturating_sub(backfill.window(kind) as u64)
        };

        Self {
            traces: start(SignalKind::Traces),
            logs: start(SignalKind::Logs),
            metrics: start(SignalKind::Metrics),
        }
    }

    pub fn position(&self, kind: SignalKind) -> Position {
        match kind {
            SignalKind::Traces => self.traces,
            SignalKind::Logs => self.logs,
            SignalKind::Metrics => self.metrics,
        }
    }

    fn slot(&mut self, kind: SignalKind) -> &mut Position {
        match kind {
            SignalKind::Traces => &mut self.traces,
            SignalKind::Logs => &mut self.logs,
            SignalKind::Metrics => &mut self.metrics,
        }
    }

    /// Read everything between the cursor and the store head, then advance
    fn advance<T: Filterable>(&mut self, store: &SignalStore<T>, filter: &Filter) -> Vec<T> {
        // Head is read first; everything below it is already visible.
        let head = store.current_position();
        let cursor = self.slot(T::KIND);
        if head <= *cursor {
            return Vec::new();
        }

        let lo = *cursor;
        *cursor = head;

        if !filter.applies_to(T::KIND) {
            return Vec::new();
        }
        store
            .buffer()
            .get_range_where(lo, head - 1, |record| record.matches(filter))
    }
}

/// Records delivered by one poll, oldest first per kind
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Delta {
    pub generation: u64,
    pub spans: Vec<Span>,
    pub logs: Vec<LogEntry>,
    pub metrics: Vec<MetricPoint>,
}

impl Delta {
    pub fn len(&self) -> usize {
        self.spans.len() + self.logs.len() + self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct PauseState {
    paused: AtomicBool,
    resumed: Notify,
}

/// Shared pause switch for a running feed
///
/// Resuming wakes a running feed so the frozen backlog is delivered without
/// waiting for the next ping or keepalive tick.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle(Arc<PauseState>);

impl PauseHandle {
    pub fn pause(&self) {
        self.0.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.0.paused.store(false, Ordering::Release);
        self.0.resumed.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.0.paused.load(Ordering::Acquire)
    }

    async fn resumed(&self) {
        self.0.resumed.notified().await
    }
}

/// Pause switches of running feeds, keyed by subscriber id
#[derive(Debug, Clone, Default)]
pub struct FeedRegistry(Arc<DashMap<u64, PauseHandle>>);

impl FeedRegistry {
    /// Track a feed's pause switch until the returned guard is dropped
    pub fn register(&self, subscriber_id: u64, handle: PauseHandle) -> FeedRegistration {
        self.0.insert(subscriber_id, handle);
        FeedRegistration {
            registry: self.clone(),
            subscriber_id,
        }
    }

    pub fn get(&self, subscriber_id: u64) -> Option<PauseHandle> {
        self.0.get(&subscriber_id).map(|entry| entry.value().clone())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Removes its feed from the [`FeedRegistry`] on drop
#[derive(Debug)]
pub struct FeedRegistration {
    registry: FeedRegistry,
    subscriber_id: u64,
}

impl Drop for FeedRegistration {
    fn drop(&mut self) {
        self.registry.0.remove(&self.subscriber_id);
    }
}

pub struct LiveFeed {
    storage: Arc<ObservabilityStorage>,
    subscription: Subscription,
    cursor: FeedCursor,
    filter: Filter,
    paused: PauseHandle,
}

impl LiveFeed {
    /// Subscribe and position the cursor `backfill` records behind the head
    pub fn new(
        storage: Arc<ObservabilityStorage>,
        filter: Filter,
        backfill: Backfill,
    ) -> Result<Self, StorageError> {
        filter.validate()?;

        // Subscribe before reading positions so no append slips between them
        let subscription = storage.subscribe();
        let cursor = FeedCursor::attach(&storage, &backfill);

        tracing::info!(
            subscriber_id = subscription.id(),
            traces = cursor.traces,
            logs = cursor.logs,
            metrics = cursor.metrics,
            "Live feed attached"
        );

        Ok(Self {
            storage,
            subscription,
            cursor,
            filter,
            paused: PauseHandle::default(),
        })
    }

    pub fn cursor(&self) -> FeedCursor {
        self.cursor
    }

    pub fn subscriber_id(&self) -> u64 {
        self.subscription.id()
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.paused.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.is_paused()
    }

    /// Next filtered delta, or `None` when paused or nothing matched
    ///
    /// Cursors advance past non-matching records, so they are never re-read.
    pub fn poll(&mut self) -> Option<Delta> {
        if self.paused.is_paused() {
            return None;
        }

        let generation = self.storage.activity().generation();
        let delta = Delta {
            generation,
            spans: self.cursor.advance(self.storage.spans(), &self.filter),
            logs: self.cursor.advance(self.storage.logs(), &self.filter),
            metrics: self.cursor.advance(self.storage.metrics(), &self.filter),
        };

        (!delta.is_empty()).then_some(delta)
    }

    /// Push deltas into `sink` until it closes or shutdown is signalled
    ///
    /// The first keepalive tick fires immediately, delivering the backfill.
    /// A closed shutdown channel is not a shutdown; the feed then runs until
    /// its sink closes.
    pub async fn run(
        mut self,
        sink: mpsc::Sender<Delta>,
        mut shutdown: broadcast::Receiver<ShutdownSignal>,
        keepalive: Duration,
    ) {
        let mut ticker = tokio::time::interval(keepalive);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let pause = self.paused.clone();
        let mut shutdown_open = true;

        loop {
            tokio::select! {
                biased;
                signal = shutdown.recv(), if shutdown_open => match signal {
                    Ok(ShutdownSignal::Graceful) | Err(RecvError::Lagged(_)) => {
                        tracing::debug!(subscriber_id = self.subscription.id(), "Live feed stopping on shutdown");
                        break;
                    }
                    Err(RecvError::Closed) => shutdown_open = false,
                },
                _ = sink.closed() => break,
                _ = pause.resumed() => {}
                changed = self.subscription.changed() => {
                    if !changed {
                        break;
                    }
                }
                _ = ticker.tick() => {}
            }

            if let Some(delta) = self.poll() {
                if sink.send(delta).await.is_err() {
                    break;
                }
            }
        }

        self.subscription.unsubscribe();
        tracing::info!(subscriber_id = self.subscription.id(), "Live feed detached");
    }
}
