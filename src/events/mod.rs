//! Structured engine events
//!
//! The engine reports its lifecycle through an injected [`EventSink`]. The
//! sink is synchronous and must not block; transport and formatting are the
//! collaborator's concern.

use crate::breaker::BreakerState;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A task was accepted and queued
    Queued {
        /// Task id
        id: Uuid,
        /// Submitted priority
        priority: i32,
    },
    /// An execution attempt began
    Started {
        /// Task id
        id: Uuid,
        /// 1-based attempt number
        attempt: u32,
    },
    /// An attempt failed retryably and a backoff sleep was scheduled
    Retried {
        /// Task id
        id: Uuid,
        /// Attempt that just failed
        attempt: u32,
        /// Backoff delay before the next attempt
        delay_ms: u64,
    },
    /// The task resolved successfully
    Succeeded {
        /// Task id
        id: Uuid,
    },
    /// The task resolved with a terminal failure
    FailedTerminal {
        /// Task id
        id: Uuid,
        /// Failure description
        reason: String,
    },
    /// The circuit breaker changed state
    BreakerStateChanged {
        /// Previous state
        from: BreakerState,
        /// New state
        to: BreakerState,
    },
    /// The pool grew by one worker
    WorkerAdded {
        /// Worker id
        worker: usize,
    },
    /// A worker left the pool
    WorkerRemoved {
        /// Worker id
        worker: usize,
    },
}

/// Destination for engine events. Implementations must be cheap and
/// non-blocking; slow transports belong behind a channel.
pub trait EventSink: Send + Sync {
    /// Deliver one event
    fn emit(&self, event: EngineEvent);
}

/// Default sink: forwards events to `tracing`
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: EngineEvent) {
        match &event {
            EngineEvent::FailedTerminal { id, reason } => {
                warn!("Task {} failed: {}", id, reason);
            }
            EngineEvent::BreakerStateChanged { from, to } => {
                warn!("Breaker state changed: {:?} -> {:?}", from, to);
            }
            _ => info!(?event, "engine event"),
        }
    }
}
