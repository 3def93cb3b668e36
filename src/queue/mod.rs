//! Queue trait and implementations

/// In-memory priority queue
pub mod memory;

use crate::task::Task;
use async_trait::async_trait;

/// A refused push. The task is handed back so the caller can resolve it;
/// a submitted task is never silently dropped.
#[derive(Debug)]
pub struct Rejected {
    /// The task that was not accepted
    pub task: Task,
    /// Why the queue refused it
    pub error: crate::EngineError,
}

/// Trait for queue implementations
#[async_trait]
pub trait Queue: Send + Sync {
    /// Add a task to the queue. Fails once the queue is closed or full.
    async fn push(&self, task: Task) -> Result<(), Rejected>;

    /// Remove and return the highest-priority ready task, waiting while the
    /// queue is empty. Returns `None` only once the queue is closed and
    /// drained.
    async fn pop(&self) -> Option<Task>;

    /// Point-in-time queue depth
    async fn len(&self) -> usize;

    /// Check if the queue is empty
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Refuse further pushes and wake all blocked `pop` callers
    async fn close(&self);

    /// Remove and return every task still queued
    async fn drain(&self) -> Vec<Task>;
}
