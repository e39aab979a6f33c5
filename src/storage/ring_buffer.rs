//! Fixed-capacity, position-indexed append log
//!
//! Every appended record gets the next logical position. Positions keep
//! counting when old entries are overwritten, so a position is never reused
//! and readers can ask for "everything after position N" without caring how
//! much was evicted in between.
//!
//! ```text
//!   evicted            retained (len <= capacity)
//! [0 .. first)   [first .................. next)
//!                  ^ first_position()        ^ current_position()
//! ```

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Logical position of a record within one ring buffer
pub type Position = u64;

struct Inner<T> {
    entries: VecDeque<T>,
    next_position: Position,
    evicted: u64,
}

impl<T> Inner<T> {
    fn first_position(&self) -> Position {
        self.next_position - self.entries.len() as Position
    }
}

/// Bounded append log shared between one writer side and many readers
///
/// Appends take the write lock for an O(1) push (plus one pop at capacity);
/// reads take the read lock and clone out what they need, so no reader ever
/// holds a reference into the buffer after the call returns.
pub struct RingBuffer<T> {
    inner: RwLock<Inner<T>>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer. A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: RwLock::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                next_position: 0,
                evicted: 0,
            }),
            capacity,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<T>> {
        // A panic while holding the lock cannot leave a torn entry behind
        // (push/pop are the only mutations), so poisoning is ignored.
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<T>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record and return its position
    pub fn append(&self, record: T) -> Position {
        self.append_evicting(record).0
    }

    /// Append a record, reporting whether the oldest entry was overwritten
    pub fn append_evicting(&self, record: T) -> (Position, bool) {
        let mut inner = self.write();

        let evicted = if inner.entries.len() >= self.capacity {
            inner.entries.pop_front();
            inner.evicted += 1;
            true
        } else {
            false
        };

        let position = inner.next_position;
        inner.entries.push_back(record);
        inner.next_position += 1;

        (position, evicted)
    }

    /// Next position to be assigned (== total number of appends so far)
    pub fn current_position(&self) -> Position {
        self.read().next_position
    }

    /// Position of the oldest retained record
    pub fn first_position(&self) -> Position {
        self.read().first_position()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of records currently retained
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Total number of records overwritten since creation
    pub fn evicted_count(&self) -> u64 {
        self.read().evicted
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Retained records with position in `[lo, hi]`, in position order
    ///
    /// Returns an empty vector when `lo > hi` or the whole range has already
    /// been evicted (or not yet written).
    pub fn get_range(&self, lo: Position, hi: Position) -> Vec<T> {
        self.get_range_where(lo, hi, |_| true)
    }

    /// Like [`get_range`](Self::get_range), cloning only records accepted by `pred`
    pub fn get_range_where<F>(&self, lo: Position, hi: Position, mut pred: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        if lo > hi {
            return Vec::new();
        }

        let inner = self.read();
        if inner.next_position == 0 {
            return Vec::new();
        }

        let first = inner.first_position();
        let lo = lo.max(first);
        let hi = hi.min(inner.next_position - 1);
        if lo > hi {
            return Vec::new();
        }

        let start = (lo - first) as usize;
        let end = (hi - first) as usize;

        inner
            .entries
            .range(start..=end)
            .filter(|record| pred(record))
            .cloned()
            .collect()
    }

    /// Up to `limit` matching records, scanned newest-first
    pub fn find_newest<F>(&self, limit: usize, mut pred: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        if limit == 0 {
            return Vec::new();
        }

        let inner = self.read();
        inner
            .entries
            .iter()
            .rev()
            .filter(|record| pred(record))
            .take(limit)
            .cloned()
            .collect()
    }

    /// All retained records, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.read().entries.iter().cloned().collect()
    }
}
