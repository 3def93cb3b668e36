//! Retrying execution wrapper
//!
//! Wraps a single task's execution with classified, bounded, backed-off
//! retries. Backoff parameters come from the config snapshot captured when
//! execution begins; reconfiguration applies to future executions only.

use crate::config::EngineConfig;
use crate::events::{EngineEvent, EventSink};
use crate::task::{ErrorKind, Task, TaskError, TaskFailure, TaskResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Maps a task error to its classification. The default reads the tag the
/// error already carries; submitters with untagged error sources can inject
/// their own.
pub type Classifier = Arc<dyn Fn(&TaskError) -> ErrorKind + Send + Sync>;

/// Default classifier: trust the tag on the error value
pub fn tag_classifier() -> Classifier {
    Arc::new(|err: &TaskError| err.kind)
}

/// Executes one task through bounded, exponentially backed-off retries
pub struct RetryPolicy {
    config: watch::Receiver<EngineConfig>,
    classifier: Classifier,
    sink: Arc<dyn EventSink>,
}

impl RetryPolicy {
    /// Create a retry policy reading backoff bounds from `config`
    pub fn new(
        config: watch::Receiver<EngineConfig>,
        classifier: Classifier,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            classifier,
            sink,
        }
    }

    /// Run the task's operation until it succeeds, fails terminally, or
    /// exhausts its retries. The backoff sleep races against `cancel`;
    /// cancellation resolves the task `Cancelled` without finishing the
    /// sleep.
    pub async fn execute(&self, task: &mut Task, cancel: &CancellationToken) -> TaskResult {
        let cfg = self.config.borrow().clone();

        loop {
            task.attempt += 1;
            self.sink.emit(EngineEvent::Started {
                id: task.id,
                attempt: task.attempt,
            });

            let err = match (task.operation)().await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            match (self.classifier)(&err) {
                ErrorKind::Terminal => {
                    debug!("Task {} failed terminally: {}", task.id, err);
                    return Err(TaskFailure::Terminal(err));
                }
                ErrorKind::Retryable => {
                    // attempt - 1 retries consumed so far
                    if task.attempt > task.max_retries {
                        return Err(TaskFailure::MaxRetriesExceeded {
                            attempts: task.attempt,
                            source: err,
                        });
                    }

                    let delay = backoff_delay(&cfg, task.attempt - 1);
                    debug!(
                        "Task {} attempt {} failed ({}), retrying in {:?}",
                        task.id, task.attempt, err, delay
                    );
                    self.sink.emit(EngineEvent::Retried {
                        id: task.id,
                        attempt: task.attempt,
                        delay_ms: delay.as_millis() as u64,
                    });

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(TaskFailure::Cancelled),
                    }
                }
            }
        }
    }
}

/// Exponent cap: 2^64 would overflow u64
const MAX_SHIFT: u32 = 63;

/// `initial_backoff * 2^attempt`, saturating, capped at `max_backoff`
fn backoff_delay(cfg: &EngineConfig, attempt: u32) -> Duration {
    let exponential = cfg
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt.min(MAX_SHIFT)));
    Duration::from_millis(exponential.min(cfg.max_backoff_ms))
}
