//! Bounded log of recent scheduler anomalies, surfaced in diagnostics.

use std::collections::VecDeque;

use serde::Serialize;

/// Fixed-capacity FIFO; pushing onto a full buffer evicts the oldest item.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }
}

/// One absorbed anomaly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Problem {
    /// Elapsed millis when it was recorded.
    pub at: i64,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ProblemLog {
    entries: RingBuffer<Problem>,
    total: u64,
}

impl ProblemLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RingBuffer::new(capacity),
            total: 0,
        }
    }

    pub fn record(&mut self, at: i64, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(at, problem = %message, "Scheduler problem recorded");
        self.total += 1;
        self.entries.push(Problem { at, message });
    }

    /// Problems ever recorded, including evicted ones.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn recent(&self) -> Vec<Problem> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
