//! # Admission Queue
//!
//! Bounded per-kind job queue with a drop policy instead of blocking.
//!
//! ```text
//!            push                                   pop
//!  FIFO:  ──→ [ e1 e2 e3 ]  full: refuse new     ──→ e1 (oldest)
//!  LIFO:  ──→ [ e1 e2 e3 ]  full: evict e1       ──→ e3 (newest)
//! ```
//!
//! Conservation holds at all times:
//! `pushed == popped + dropped + len`.

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::entities::ObjectKind;
use super::errors::QueueError;
use super::value_objects::{QueueConfig, QueueOrder};

/// Result of a successful `push`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Entry admitted, nothing discarded.
    Accepted,
    /// Entry admitted, the oldest resident was discarded (LIFO).
    AcceptedEvictedOldest,
    /// Entry refused because the queue is full (FIFO).
    Dropped,
}

impl PushOutcome {
    pub fn dropped_any(self) -> bool {
        !matches!(self, PushOutcome::Accepted)
    }
}

/// Point-in-time counters of one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pushed: u64,
    pub popped: u64,
    pub dropped: u64,
    pub len: usize,
}

struct QueueState<T> {
    items: VecDeque<T>,
    stats: QueueStats,
    closed: bool,
}

/// Bounded job queue for one object kind.
pub struct JobQueue<T> {
    kind: ObjectKind,
    config: QueueConfig,
    state: Mutex<QueueState<T>>,
}

impl<T> JobQueue<T> {
    pub fn new(kind: ObjectKind, config: QueueConfig) -> Self {
        Self {
            kind,
            config,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(config.capacity.min(1024)),
                stats: QueueStats::default(),
                closed: false,
            }),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn config(&self) -> QueueConfig {
        self.config
    }

    /// Admit `item`, applying the drop policy when full. Never blocks.
    pub fn push(&self, item: T) -> Result<PushOutcome, QueueError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QueueError::Closed(self.kind));
        }
        state.stats.pushed += 1;

        if state.items.len() < self.config.capacity {
            state.items.push_back(item);
            state.stats.len = state.items.len();
            return Ok(PushOutcome::Accepted);
        }

        state.stats.dropped += 1;
        match self.config.order {
            QueueOrder::Fifo => Ok(PushOutcome::Dropped),
            QueueOrder::Lifo => {
                state.items.pop_front();
                state.items.push_back(item);
                Ok(PushOutcome::AcceptedEvictedOldest)
            }
        }
    }

    /// Next entry to process according to the queue order.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        let item = match self.config.order {
            QueueOrder::Fifo => state.items.pop_front(),
            QueueOrder::Lifo => state.items.pop_back(),
        };
        if item.is_some() {
            state.stats.popped += 1;
            state.stats.len = state.items.len();
        }
        item
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse further admissions. Resident entries stay poppable.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    pub fn stats(&self) -> QueueStats {
        self.state.lock().stats
    }
}
