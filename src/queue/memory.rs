//! In-memory priority queue
//!
//! Strict priority ordering, FIFO among equal priorities. Under continuous
//! high-priority arrival, lower priorities can starve; no aging is applied.

use crate::config::EngineConfig;
use crate::queue::{Queue, Rejected};
use crate::task::Task;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tokio::sync::{watch, Mutex, Notify};
use tracing::debug;

/// Wrapper for Task to implement priority queue ordering
struct QueuedTask {
    task: Task,
    /// Sequence number for FIFO ordering within same priority
    sequence: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task.priority == other.task.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first; among equals, lower sequence first
        // (reversed because BinaryHeap is a max-heap)
        match self.task.priority.cmp(&other.task.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other => other,
        }
    }
}

struct Inner {
    heap: BinaryHeap<QueuedTask>,
    sequence: u64,
    closed: bool,
}

/// In-memory priority queue. `pop` blocks on a [`Notify`] while the queue is
/// empty; there is no sleep-and-recheck polling anywhere.
pub struct MemoryQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    config: watch::Receiver<EngineConfig>,
}

impl MemoryQueue {
    /// Create a queue bounded by the `max_queue_size` of the live config
    pub fn new(config: watch::Receiver<EngineConfig>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                sequence: 0,
                closed: false,
            }),
            notify: Notify::new(),
            config,
        }
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn push(&self, task: Task) -> Result<(), Rejected> {
        // Capacity is read from the current snapshot, so reconfiguration
        // applies to future pushes
        let capacity = self.config.borrow().max_queue_size;

        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(Rejected {
                task,
                error: crate::EngineError::QueueClosed,
            });
        }
        if inner.heap.len() >= capacity {
            return Err(Rejected {
                task,
                error: crate::EngineError::QueueFull { capacity },
            });
        }

        let sequence = inner.sequence;
        inner.sequence += 1;

        debug!(
            "Task {} enqueued with priority {} (sequence: {})",
            task.id, task.priority, sequence
        );
        inner.heap.push(QueuedTask { task, sequence });
        drop(inner);

        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self) -> Option<Task> {
        loop {
            // Register interest before checking, so a push between the check
            // and the await leaves a stored permit instead of a lost wakeup
            let notified = self.notify.notified();

            {
                let mut inner = self.inner.lock().await;
                if let Some(queued) = inner.heap.pop() {
                    debug!(
                        "Task {} dequeued with priority {}",
                        queued.task.id, queued.task.priority
                    );
                    return Some(queued.task);
                }
                if inner.closed {
                    // Cascade the wakeup so every blocked popper drains out
                    self.notify.notify_one();
                    return None;
                }
            }

            notified.await;
        }
    }

    async fn len(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.heap.len()
    }

    async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        drop(inner);

        debug!("Queue closed");
        self.notify.notify_one();
    }

    async fn drain(&self) -> Vec<Task> {
        let mut inner = self.inner.lock().await;
        inner.heap.drain().map(|queued| queued.task).collect()
    }
}
