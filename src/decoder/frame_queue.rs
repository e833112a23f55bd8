//! Bounded blocking frame buffers
//!
//! [`FrameBuffer`] is the hand-off point between pipeline stages. The decode
//! worker pushes into the CPU buffer and blocks while it is full; the update
//! thread drains it into the GPU buffer without blocking. Closing a buffer
//! wakes every waiter so teardown never hangs on a blocked push or pop.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Bounded FIFO shared between a producer and a consumer thread
pub struct FrameBuffer<T> {
    /// Queued items and bookkeeping
    inner: Mutex<Inner<T>>,

    /// Signaled when an item is pushed or the buffer is closed
    not_empty: Condvar,

    /// Signaled when an item is removed or the buffer is closed
    not_full: Condvar,

    /// Maximum number of queued items
    capacity: usize,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
    stats: QueueStats,
}

/// Queue statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Total items added
    pub frames_added: u64,

    /// Total items consumed by pops
    pub frames_consumed: u64,

    /// Total items discarded by flushes
    pub frames_flushed: u64,

    /// Current queue depth
    pub current_depth: usize,

    /// Maximum queue depth reached
    pub max_depth: usize,
}

/// Reason a non-blocking push was refused; the item is handed back
#[derive(PartialEq, Eq)]
pub enum PushError<T> {
    /// The buffer is at capacity
    Full(T),

    /// The buffer has been closed
    Closed(T),
}

impl<T> PushError<T> {
    /// Recover the rejected item
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.write_str("Full(..)"),
            PushError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> FrameBuffer<T> {
    /// Create a buffer holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                stats: QueueStats::default(),
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Push an item, blocking while the buffer is full
    ///
    /// Returns the item back if the buffer is closed before room frees up.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut inner = self.inner.lock();
        while !inner.closed && inner.items.len() >= self.capacity {
            self.not_full.wait(&mut inner);
        }
        if inner.closed {
            return Err(item);
        }
        Self::enqueue(&mut inner, item);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Push an item without blocking
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(PushError::Closed(item));
        }
        if inner.items.len() >= self.capacity {
            return Err(PushError::Full(item));
        }
        Self::enqueue(&mut inner, item);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pop the oldest item, blocking while the buffer is empty
    ///
    /// Returns `None` once the buffer is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        while !inner.closed && inner.items.is_empty() {
            self.not_empty.wait(&mut inner);
        }
        self.dequeue(inner)
    }

    /// Pop the oldest item without blocking
    pub fn try_pop(&self) -> Option<T> {
        let inner = self.inner.lock();
        self.dequeue(inner)
    }

    /// Pop the oldest item, waiting at most `timeout` for one to arrive
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !inner.closed && inner.items.is_empty() {
            if self.not_empty.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        self.dequeue(inner)
    }

    /// Drop every queued item and return how many were discarded
    pub fn flush(&self) -> usize {
        let drained: Vec<T> = {
            let mut inner = self.inner.lock();
            let drained: Vec<T> = inner.items.drain(..).collect();
            inner.stats.frames_flushed += drained.len() as u64;
            inner.stats.current_depth = 0;
            drained
        };
        self.not_full.notify_all();
        drained.len()
    }

    /// Close the buffer and wake every blocked producer and consumer
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Whether the buffer has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Current number of queued items (advisory)
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Check if the buffer is empty (advisory)
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Check if the buffer is at capacity (advisory)
    pub fn is_full(&self) -> bool {
        self.inner.lock().items.len() >= self.capacity
    }

    /// Maximum number of queued items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the queue statistics
    pub fn stats(&self) -> QueueStats {
        self.inner.lock().stats.clone()
    }

    fn enqueue(inner: &mut Inner<T>, item: T) {
        inner.items.push_back(item);
        inner.stats.frames_added += 1;
        inner.stats.current_depth = inner.items.len();
        inner.stats.max_depth = inner.stats.max_depth.max(inner.items.len());
    }

    fn dequeue(&self, mut inner: parking_lot::MutexGuard<'_, Inner<T>>) -> Option<T> {
        let item = inner.items.pop_front()?;
        inner.stats.frames_consumed += 1;
        inner.stats.current_depth = inner.items.len();
        drop(inner);
        self.not_full.notify_one();
        Some(item)
    }
}

impl<T> fmt::Debug for FrameBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("FrameBuffer")
            .field("len", &inner.items.len())
            .field("capacity", &self.capacity)
            .field("closed", &inner.closed)
            .finish()
    }
}
