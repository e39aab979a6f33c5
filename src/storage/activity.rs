//! Activity counters and change notification
//!
//! `ActivityCache` is the one place that knows "something was accepted". It
//! owns the per-kind received totals, the process-wide generation counter and
//! the registry of live subscriptions. Notifications carry no payload: a
//! subscriber that gets pinged re-reads positions from the stores, so a ping
//! dropped because the mailbox is full loses nothing.

use super::record::SignalKind;
use crate::metrics;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};

type Registry = DashMap<u64, mpsc::Sender<()>>;

/// Counters snapshot served by the status API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActivitySnapshot {
    pub generation: u64,
    pub spans_received: u64,
    pub logs_received: u64,
    pub metrics_received: u64,
    pub uptime_seconds: u64,
    pub subscribers: usize,
}

/// Received counters, generation and subscription registry
pub struct ActivityCache {
    generation: AtomicU64,
    spans_received: AtomicU64,
    logs_received: AtomicU64,
    metrics_received: AtomicU64,
    started_at: Instant,

    subscribers: Arc<Registry>,
    next_subscriber_id: AtomicU64,
    subscriber_buffer: usize,
}

impl ActivityCache {
    /// Create a cache whose subscribers get a mailbox of `subscriber_buffer` pings
    pub fn new(subscriber_buffer: usize) -> Self {
        Self {
            generation: AtomicU64::new(0),
            spans_received: AtomicU64::new(0),
            logs_received: AtomicU64::new(0),
            metrics_received: AtomicU64::new(0),
            started_at: Instant::now(),
            subscribers: Arc::new(DashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
            subscriber_buffer: subscriber_buffer.max(1),
        }
    }

    /// Count an accepted record, bump the generation and ping every subscriber
    ///
    /// Must be called after the record is visible in its store. Returns the
    /// new generation.
    pub fn record_accepted(&self, kind: SignalKind) -> u64 {
        self.counter(kind).fetch_add(1, Ordering::Relaxed);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        self.notify_all();
        generation
    }

    fn counter(&self, kind: SignalKind) -> &AtomicU64 {
        match kind {
            SignalKind::Traces => &self.spans_received,
            SignalKind::Logs => &self.logs_received,
            SignalKind::Metrics => &self.metrics_received,
        }
    }

    fn notify_all(&self) {
        let mut closed = Vec::new();

        for entry in self.subscribers.iter() {
            match entry.value().try_send(()) {
                Ok(()) => {}
                // A ping is already pending; this change will be seen with it.
                Err(TrySendError::Full(())) => metrics::record_notification_dropped(),
                Err(TrySendError::Closed(())) => closed.push(*entry.key()),
            }
        }

        if closed.is_empty() {
            return;
        }

        // Removal has to wait until the iteration guard is released.
        for id in closed {
            if self.subscribers.remove(&id).is_some() {
                tracing::debug!(subscriber_id = id, "Removed subscriber with closed receiver");
            }
        }
        metrics::set_subscribers(self.subscribers.len());
    }

    /// Register a new subscription
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        self.subscribers.insert(id, tx);

        let count = self.subscribers.len();
        metrics::set_subscribers(count);
        tracing::debug!(subscriber_id = id, subscribers = count, "Subscriber attached");

        Subscription {
            id,
            receiver: rx,
            registry: self.subscribers.clone(),
            unsubscribed: AtomicBool::new(false),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn spans_received(&self) -> u64 {
        self.spans_received.load(Ordering::Relaxed)
    }

    pub fn logs_received(&self) -> u64 {
        self.logs_received.load(Ordering::Relaxed)
    }

    pub fn metrics_received(&self) -> u64 {
        self.metrics_received.load(Ordering::Relaxed)
    }

    pub fn received(&self, kind: SignalKind) -> u64 {
        self.counter(kind).load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn snapshot(&self) -> ActivitySnapshot {
        ActivitySnapshot {
            generation: self.generation(),
            spans_received: self.spans_received(),
            logs_received: self.logs_received(),
            metrics_received: self.metrics_received(),
            uptime_seconds: self.uptime_seconds(),
            subscribers: self.subscriber_count(),
        }
    }
}

impl Default for ActivityCache {
    fn default() -> Self {
        Self::new(1)
    }
}

/// A consumer's private notification channel
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<()>,
    registry: Arc<Registry>,
    unsubscribed: AtomicBool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next change ping
    ///
    /// Returns `false` once the subscription has been removed from the
    /// registry and every pending ping has been consumed.
    pub async fn changed(&mut self) -> bool {
        self.receiver.recv().await.is_some()
    }

    /// Consume a pending ping without waiting
    pub fn try_changed(&mut self) -> bool {
        self.receiver.try_recv().is_ok()
    }

    /// Remove the registry entry, which drops the sender and closes the channel
    ///
    /// Safe to call more than once and concurrently with a notify: the
    /// sender only exists in the registry, so it is dropped exactly once.
    pub fn unsubscribe(&self) {
        if self.unsubscribed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.registry.remove(&self.id);
        let count = self.registry.len();
        metrics::set_subscribers(count);
        tracing::debug!(subscriber_id = self.id, subscribers = count, "Subscriber detached");
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.unsubscribed.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
