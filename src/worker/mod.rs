//! Workers
//!
//! A worker loops: pop the highest-priority task, ask the breaker for
//! admission, run the task through the retry policy, report the final
//! outcome back to the breaker, resolve the submitter's handle.

/// Worker pool implementation
pub mod pool;
/// Periodic pool-size controller
pub mod scaler;

use crate::breaker::CircuitBreaker;
use crate::config::{CircuitPolicy, EngineConfig};
use crate::events::{EngineEvent, EventSink};
use crate::queue::Queue;
use crate::task::retry::RetryPolicy;
use crate::task::{Task, TaskFailure};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A worker that processes tasks from the shared queue
pub struct Worker {
    id: usize,
    breaker: Arc<CircuitBreaker>,
    retry: Arc<RetryPolicy>,
    sink: Arc<dyn EventSink>,
    pending: Arc<AtomicUsize>,
    config: watch::Receiver<EngineConfig>,
    /// Cancelled to retire this one worker after its current task
    retire: CancellationToken,
    /// Engine-wide stop signal; interrupts in-flight retry sleeps
    shutdown: CancellationToken,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: usize,
        breaker: Arc<CircuitBreaker>,
        retry: Arc<RetryPolicy>,
        sink: Arc<dyn EventSink>,
        pending: Arc<AtomicUsize>,
        config: watch::Receiver<EngineConfig>,
        retire: CancellationToken,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            breaker,
            retry,
            sink,
            pending,
            config,
            retire,
            shutdown,
        }
    }

    /// Process tasks until the queue closes or this worker is retired
    pub async fn run(&self, queue: Arc<dyn Queue>) {
        info!("Worker {} started", self.id);

        loop {
            let popped = tokio::select! {
                popped = queue.pop() => popped,
                _ = self.retire.cancelled() => break,
            };

            let Some(task) = popped else {
                // Queue closed and drained
                break;
            };

            self.process(task, &queue).await;

            if self.retire.is_cancelled() {
                break;
            }
        }

        info!("Worker {} stopped", self.id);
    }

    async fn process(&self, mut task: Task, queue: &Arc<dyn Queue>) {
        if !self.breaker.allow().await {
            self.reject(task, queue).await;
            return;
        }

        debug!("Worker {} processing task {}", self.id, task.id);
        let result = self.retry.execute(&mut task, &self.shutdown).await;

        match &result {
            Ok(()) => {
                self.breaker.report_success().await;
                self.sink.emit(EngineEvent::Succeeded { id: task.id });
            }
            Err(failure @ (TaskFailure::Terminal(_) | TaskFailure::MaxRetriesExceeded { .. })) => {
                self.breaker.report_failure().await;
                self.sink.emit(EngineEvent::FailedTerminal {
                    id: task.id,
                    reason: failure.to_string(),
                });
            }
            Err(_) => {
                // Cancelled is engine-level; the downstream never saw the
                // call complete, so nothing is reported to the breaker
            }
        }

        // Decrement before resolving so a submitter observing the outcome
        // never sees a stale pending count
        self.pending.fetch_sub(1, Ordering::SeqCst);
        task.resolve(result);
    }

    /// Apply the configured policy to a task the breaker refused
    async fn reject(&self, mut task: Task, queue: &Arc<dyn Queue>) {
        let policy = self.config.borrow().circuit_policy;
        match policy {
            CircuitPolicy::FailFast => {
                debug!(
                    "Worker {} rejecting task {}: circuit open",
                    self.id, task.id
                );
                self.sink.emit(EngineEvent::FailedTerminal {
                    id: task.id,
                    reason: TaskFailure::CircuitOpen.to_string(),
                });
                self.pending.fetch_sub(1, Ordering::SeqCst);
                task.resolve(Err(TaskFailure::CircuitOpen));
            }
            CircuitPolicy::Requeue => {
                let id = task.id;
                match queue.push(task).await {
                    Ok(()) => {
                        debug!("Worker {} requeued task {}: circuit open", self.id, id);
                        // Pause before the next pop so an open breaker does
                        // not turn the queue into a hot requeue loop
                        let pause = self.config.borrow().initial_backoff();
                        tokio::select! {
                            _ = tokio::time::sleep(pause) => {}
                            _ = self.shutdown.cancelled() => {}
                        }
                    }
                    Err(mut rejected) => {
                        // Queue closed or full; the task still resolves
                        self.pending.fetch_sub(1, Ordering::SeqCst);
                        rejected.task.resolve(Err(TaskFailure::Cancelled));
                    }
                }
            }
        }
    }
}
