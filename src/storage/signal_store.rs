//! Per-kind store: one ring buffer plus a service-name index

use super::record::{ServiceScoped, SignalKind};
use super::ring_buffer::{Position, RingBuffer};
use crate::metrics;
use dashmap::DashSet;
use serde::Serialize;
use std::collections::BTreeSet;

/// Retention statistics for one store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub retained: usize,
    pub capacity: usize,
    pub current_position: Position,
    pub evicted: u64,
}

/// Bounded recent history for a single signal kind
pub struct SignalStore<T> {
    kind: SignalKind,
    buffer: RingBuffer<T>,

    // Distinct services ever seen; outlives eviction of their records
    services: DashSet<String>,
}

impl<T: ServiceScoped> SignalStore<T> {
    pub fn new(kind: SignalKind, capacity: usize) -> Self {
        Self {
            kind,
            buffer: RingBuffer::new(capacity),
            services: DashSet::new(),
        }
    }

    /// Append a record and index its service
    pub fn record(&self, record: T) -> Position {
        let service = record.service_name();
        if !self.services.contains(service) {
            self.services.insert(service.to_string());
        }

        let (position, evicted) = self.buffer.append_evicting(record);
        if evicted {
            metrics::record_eviction(self.kind);
            tracing::trace!(kind = %self.kind, position, "Oldest record evicted");
        }
        position
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// Underlying buffer, for position-based delta reads
    pub fn buffer(&self) -> &RingBuffer<T> {
        &self.buffer
    }

    pub fn current_position(&self) -> Position {
        self.buffer.current_position()
    }

    /// Distinct service names observed by this store
    pub fn services(&self) -> BTreeSet<String> {
        self.services.iter().map(|s| s.key().clone()).collect()
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.services.contains(service)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            retained: self.buffer.len(),
            capacity: self.buffer.capacity(),
            current_position: self.buffer.current_position(),
            evicted: self.buffer.evicted_count(),
        }
    }
}

impl<T: ServiceScoped + Clone> SignalStore<T> {
    /// Retained records with position in `[lo, hi]`
    pub fn get_range(&self, lo: Position, hi: Position) -> Vec<T> {
        self.buffer.get_range(lo, hi)
    }
}
