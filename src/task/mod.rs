//! Task definitions and outcomes

/// Retrying execution wrapper
pub mod retry;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::fmt;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

/// The unit of work carried by a task: a closure producing a fresh future
/// per attempt.
pub type Operation = Box<dyn FnMut() -> BoxFuture<'static, Result<(), TaskError>> + Send>;

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient failure, worth retrying
    Retryable,
    /// Permanent failure, retrying cannot help
    Terminal,
}

/// Error returned by a task operation. The classification is carried as a
/// tag on the value; the retry policy consults it through an injected
/// classifier rather than inspecting concrete error types.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TaskError {
    /// Retryable or Terminal
    pub kind: ErrorKind,
    /// Human-readable cause
    pub message: String,
}

impl TaskError {
    /// A transient error the retry policy may absorb
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Retryable,
            message: message.into(),
        }
    }

    /// A permanent error that surfaces immediately
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Terminal,
            message: message.into(),
        }
    }
}

/// Terminal failure outcomes. Every submitted task resolves to exactly one
/// `TaskResult`; retryable errors never surface here unless retries are
/// exhausted.
#[derive(Debug, Clone, Error)]
pub enum TaskFailure {
    /// The operation failed permanently
    #[error("terminal failure: {0}")]
    Terminal(TaskError),

    /// Retries were exhausted; carries the last underlying cause
    #[error("max retries exceeded after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        /// Total attempts made
        attempts: u32,
        /// Last retryable error observed
        source: TaskError,
    },

    /// The circuit breaker refused the task; the operation never ran
    #[error("rejected: circuit open")]
    CircuitOpen,

    /// Shutdown or deadline interrupted the task
    #[error("cancelled")]
    Cancelled,
}

/// Terminal outcome of a task
pub type TaskResult = Result<(), TaskFailure>;

/// Handle returned to the submitter. Await [`TaskHandle::wait`] or poll
/// [`TaskHandle::try_result`] for the terminal outcome.
pub struct TaskHandle {
    /// Identifier of the submitted task
    pub id: Uuid,
    rx: oneshot::Receiver<TaskResult>,
}

impl TaskHandle {
    /// Wait for the terminal outcome. A force-stopped worker drops the
    /// sender; that surfaces as `Cancelled`, never as a hang or silent drop.
    pub async fn wait(self) -> TaskResult {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(TaskFailure::Cancelled),
        }
    }

    /// Poll for the outcome without waiting. Returns `None` while the task
    /// is still pending.
    pub fn try_result(&mut self) -> Option<TaskResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TaskFailure::Cancelled)),
        }
    }
}

/// A submitted unit of work. Exclusively owned by the queue until claimed;
/// ownership then transfers to the claiming worker for the duration of all
/// its retry attempts.
pub struct Task {
    /// Unique task identifier
    pub id: Uuid,

    /// Scheduling priority; higher values run first
    pub priority: i32,

    /// Attempts made so far
    pub attempt: u32,

    /// Maximum retry attempts allowed
    pub max_retries: u32,

    /// Task creation timestamp
    pub created_at: DateTime<Utc>,

    pub(crate) operation: Operation,
    pub(crate) completion: Option<oneshot::Sender<TaskResult>>,
}

impl Task {
    /// Create a task and the handle its submitter keeps
    pub fn new(priority: i32, operation: Operation, max_retries: u32) -> (Self, TaskHandle) {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        let task = Self {
            id,
            priority,
            attempt: 0,
            max_retries,
            created_at: Utc::now(),
            operation,
            completion: Some(tx),
        };
        (task, TaskHandle { id, rx })
    }

    /// Deliver the terminal outcome to the submitter. Each task resolves
    /// exactly once; a second call is a no-op.
    pub(crate) fn resolve(&mut self, result: TaskResult) {
        if let Some(tx) = self.completion.take() {
            // The submitter may have dropped its handle; that's fine
            let _ = tx.send(result);
        }
    }

    /// Task age in seconds
    pub fn age_seconds(&self) -> i64 {
        (Utc::now() - self.created_at).num_seconds()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("attempt", &self.attempt)
            .field("max_retries", &self.max_retries)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
