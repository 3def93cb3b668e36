//! Circuit breaker
//!
//! Tri-state gate protecting the downstream operation from being hammered
//! while it is failing. All state lives behind one lock; `allow`,
//! `report_success`, and `report_failure` are the sole mutation entry points.
//! Thresholds come from the config snapshot captured at entry to each call,
//! so reconfiguration affects future decisions only.

use crate::config::EngineConfig;
use crate::events::{EngineEvent, EventSink};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, RwLock};
use tracing::debug;

/// Breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BreakerState {
    /// Calls flow freely; failures are counted
    Closed,
    /// Calls are refused until the cooldown elapses
    Open,
    /// One probe call is admitted to test recovery
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    /// An admitted half-open probe whose outcome has not been reported yet
    probe_in_flight: bool,
}

impl BreakerInner {
    fn transition(&mut self, to: BreakerState, sink: &Arc<dyn EventSink>) {
        let from = self.state;
        self.state = to;
        sink.emit(EngineEvent::BreakerStateChanged { from, to });
    }
}

/// Tri-state circuit breaker. Created once at startup and shared by handle.
pub struct CircuitBreaker {
    config: watch::Receiver<EngineConfig>,
    inner: RwLock<BreakerInner>,
    sink: Arc<dyn EventSink>,
}

impl CircuitBreaker {
    /// Create a closed breaker reading thresholds from `config`
    pub fn new(config: watch::Receiver<EngineConfig>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            inner: RwLock::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                probe_in_flight: false,
            }),
            sink,
        }
    }

    /// May a call proceed right now? In Open, becomes true once the cooldown
    /// has elapsed since the last failure, admitting exactly one probe.
    pub async fn allow(&self) -> bool {
        let cfg = self.config.borrow().clone();
        let mut inner = self.inner.write().await;

        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let cooled_down = inner
                    .last_failure
                    .map(|last| last.elapsed() > cfg.cooldown())
                    .unwrap_or(true);
                if cooled_down {
                    inner.transition(BreakerState::HalfOpen, &self.sink);
                    inner.success_count = 0;
                    inner.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                // One trial at a time; others wait for the probe's outcome
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Report a successful final outcome
    pub async fn report_success(&self) {
        let cfg = self.config.borrow().clone();
        let mut inner = self.inner.write().await;

        match inner.state {
            BreakerState::Closed => {
                inner.failure_count = 0;
            }
            BreakerState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.success_count += 1;
                if inner.success_count >= cfg.success_threshold {
                    inner.transition(BreakerState::Closed, &self.sink);
                    inner.failure_count = 0;
                    inner.success_count = 0;
                }
            }
            BreakerState::Open => {
                // Stale report from a call admitted before the trip
                debug!("Ignoring success reported while breaker is open");
            }
        }
    }

    /// Report a failed final outcome
    pub async fn report_failure(&self) {
        let cfg = self.config.borrow().clone();
        let mut inner = self.inner.write().await;

        match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= cfg.failure_threshold {
                    inner.transition(BreakerState::Open, &self.sink);
                    inner.last_failure = Some(Instant::now());
                    inner.failure_count = 0;
                }
            }
            BreakerState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.transition(BreakerState::Open, &self.sink);
                inner.last_failure = Some(Instant::now());
            }
            BreakerState::Open => {
                debug!("Ignoring failure reported while breaker is open");
            }
        }
    }

    /// Current state, for observability and tests
    pub async fn state(&self) -> BreakerState {
        self.inner.read().await.state
    }
}
