//! Task Engine RS - An adaptive in-process task-execution engine
//!
//! This library combines a priority work queue, a dynamically sized worker
//! pool, a circuit breaker guarding failure-prone operations, a retrying
//! execution wrapper, and live reconfiguration of all of the above.

/// Circuit breaker guarding task execution
pub mod breaker;
/// Configuration snapshots and loading
pub mod config;
/// Engine facade tying the components together
pub mod engine;
/// Structured engine events and sinks
pub mod events;
/// Queue implementations and traits
pub mod queue;
/// Task definitions, outcomes, and retry logic
pub mod task;
/// Worker pool, workers, and the scaling controller
pub mod worker;

pub use breaker::{BreakerState, CircuitBreaker};
pub use config::{CircuitPolicy, EngineConfig};
pub use engine::Engine;
pub use events::{EngineEvent, EventSink, TracingSink};
pub use queue::memory::MemoryQueue;
pub use task::{ErrorKind, Task, TaskError, TaskFailure, TaskHandle, TaskResult};
pub use worker::pool::WorkerPool;

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error types for the engine itself. Task-level outcomes are reported
/// through [`task::TaskFailure`], never through this enum.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Queue has been closed, no further submissions accepted
    #[error("Queue is closed")]
    QueueClosed,

    /// Queue is at capacity
    #[error("Queue is full (capacity {capacity})")]
    QueueFull {
        /// Configured queue capacity
        capacity: usize,
    },

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Worker pool encountered an error
    #[error("Worker pool error: {0}")]
    WorkerPoolError(String),

    /// Graceful shutdown did not complete within the grace period
    #[error("Shutdown grace period exceeded")]
    ShutdownTimeout,
}
