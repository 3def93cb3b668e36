//! Dynamic worker pool
//!
//! Every spawned worker lives in a managed slot set, so the pool size is
//! always known and `max_workers` is a hard ceiling. Retirement cancels one
//! worker's own token; the worker finishes its current task, then exits.

use crate::breaker::CircuitBreaker;
use crate::config::EngineConfig;
use crate::events::{EngineEvent, EventSink};
use crate::queue::Queue;
use crate::task::retry::RetryPolicy;
use crate::worker::Worker;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{info, warn};

struct WorkerSlot {
    id: usize,
    retire: tokio_util::sync::CancellationToken,
    handle: JoinHandle<()>,
}

/// A bounded pool of workers processing tasks concurrently
pub struct WorkerPool {
    slots: Mutex<Vec<WorkerSlot>>,
    /// Handles of retired workers, joined at shutdown
    retired: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicUsize,
    pending: Arc<AtomicUsize>,
    queue: Arc<dyn Queue>,
    breaker: Arc<CircuitBreaker>,
    retry: Arc<RetryPolicy>,
    sink: Arc<dyn EventSink>,
    config: watch::Receiver<EngineConfig>,
    shutdown: tokio_util::sync::CancellationToken,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        queue: Arc<dyn Queue>,
        breaker: Arc<CircuitBreaker>,
        retry: Arc<RetryPolicy>,
        sink: Arc<dyn EventSink>,
        pending: Arc<AtomicUsize>,
        config: watch::Receiver<EngineConfig>,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            retired: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
            pending,
            queue,
            breaker,
            retry,
            sink,
            config,
            shutdown,
        }
    }

    /// Spawn workers up to the configured floor
    pub async fn start(&self) -> crate::Result<()> {
        let min_workers = self.config.borrow().min_workers;
        info!("Starting worker pool with {} workers", min_workers);

        for _ in 0..min_workers {
            if !self.spawn_worker().await {
                return Err(crate::EngineError::WorkerPoolError(
                    "Failed to start initial workers".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Add one worker. Returns `false` at the `max_workers` ceiling; the
    /// ceiling is enforced here, not just in the scaling controller.
    pub async fn spawn_worker(&self) -> bool {
        let max_workers = self.config.borrow().max_workers;
        let mut slots = self.slots.lock().await;
        if slots.len() >= max_workers {
            return false;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let retire = self.shutdown.child_token();
        let worker = Worker::new(
            id,
            Arc::clone(&self.breaker),
            Arc::clone(&self.retry),
            Arc::clone(&self.sink),
            Arc::clone(&self.pending),
            self.config.clone(),
            retire.clone(),
            self.shutdown.clone(),
        );

        let queue = Arc::clone(&self.queue);
        let handle = tokio::spawn(async move {
            worker.run(queue).await;
        });

        slots.push(WorkerSlot { id, retire, handle });
        drop(slots);

        self.sink.emit(EngineEvent::WorkerAdded { worker: id });
        true
    }

    /// Signal exactly one worker to exit after its current task. Returns
    /// `false` at the `min_workers` floor.
    pub async fn retire_one(&self) -> bool {
        let min_workers = self.config.borrow().min_workers;
        let mut slots = self.slots.lock().await;
        if slots.len() <= min_workers {
            return false;
        }

        // Newest worker goes first
        let slot = match slots.pop() {
            Some(slot) => slot,
            None => return false,
        };
        drop(slots);

        slot.retire.cancel();
        self.retired.lock().await.push(slot.handle);
        self.sink.emit(EngineEvent::WorkerRemoved { worker: slot.id });
        true
    }

    /// Number of workers currently in the pool
    pub async fn worker_count(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// Tasks submitted but not yet terminally resolved
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait for every worker to finish, up to `grace`. Workers still running
    /// at the deadline are aborted; their tasks surface as `Cancelled`
    /// through the dropped completion senders.
    pub async fn join_all(&self, grace: Duration) -> crate::Result<()> {
        let mut handles: Vec<(usize, JoinHandle<()>)> = Vec::new();
        for slot in self.slots.lock().await.drain(..) {
            handles.push((slot.id, slot.handle));
        }
        for handle in self.retired.lock().await.drain(..) {
            handles.push((usize::MAX, handle));
        }

        let deadline = Instant::now() + grace;
        let mut timed_out = false;

        for (id, mut handle) in handles {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Worker {} panicked: {}", id, e),
                Err(_) => {
                    warn!("Worker {} exceeded shutdown grace period, aborting", id);
                    handle.abort();
                    let _ = handle.await;
                    timed_out = true;
                }
            }
        }

        if timed_out {
            Err(crate::EngineError::ShutdownTimeout)
        } else {
            info!("All workers stopped");
            Ok(())
        }
    }
}
