//! Engine facade
//!
//! Wires the queue, breaker, retry policy, worker pool, and scaling
//! controller together behind a submit/reconfigure/shutdown surface. All
//! components read tunables from one watch channel; publishing a new
//! snapshot is atomic and never blocks on subscribers.

use crate::breaker::CircuitBreaker;
use crate::config::EngineConfig;
use crate::events::{EngineEvent, EventSink, TracingSink};
use crate::queue::memory::MemoryQueue;
use crate::queue::Queue;
use crate::task::retry::{tag_classifier, Classifier, RetryPolicy};
use crate::task::{Operation, Task, TaskError, TaskFailure, TaskHandle};
use crate::worker::pool::WorkerPool;
use crate::worker::scaler::ScalingController;
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// The adaptive task-execution engine
pub struct Engine {
    config_tx: watch::Sender<EngineConfig>,
    queue: Arc<dyn Queue>,
    breaker: Arc<CircuitBreaker>,
    pool: Arc<WorkerPool>,
    scaler: Mutex<Option<JoinHandle<()>>>,
    shutdown: tokio_util::sync::CancellationToken,
    pending: Arc<AtomicUsize>,
    sink: Arc<dyn EventSink>,
    started: AtomicBool,
}

impl Engine {
    /// Create an engine with the default tracing sink and tag classifier
    pub fn new(config: EngineConfig) -> crate::Result<Self> {
        Self::with_parts(config, Arc::new(TracingSink), tag_classifier())
    }

    /// Create an engine emitting events to `sink`
    pub fn with_sink(config: EngineConfig, sink: Arc<dyn EventSink>) -> crate::Result<Self> {
        Self::with_parts(config, sink, tag_classifier())
    }

    /// Create an engine with an explicit sink and error classifier
    pub fn with_parts(
        config: EngineConfig,
        sink: Arc<dyn EventSink>,
        classifier: Classifier,
    ) -> crate::Result<Self> {
        config.validate()?;

        let (config_tx, config_rx) = watch::channel(config);
        let shutdown = tokio_util::sync::CancellationToken::new();
        let pending = Arc::new(AtomicUsize::new(0));

        let queue: Arc<dyn Queue> = Arc::new(MemoryQueue::new(config_rx.clone()));
        let breaker = Arc::new(CircuitBreaker::new(config_rx.clone(), Arc::clone(&sink)));
        let retry = Arc::new(RetryPolicy::new(
            config_rx.clone(),
            classifier,
            Arc::clone(&sink),
        ));
        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&queue),
            Arc::clone(&breaker),
            retry,
            Arc::clone(&sink),
            Arc::clone(&pending),
            config_rx,
            shutdown.clone(),
        ));

        Ok(Self {
            config_tx,
            queue,
            breaker,
            pool,
            scaler: Mutex::new(None),
            shutdown,
            pending,
            sink,
            started: AtomicBool::new(false),
        })
    }

    /// Spawn the initial workers and the scaling controller
    pub async fn start(&self) -> crate::Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(crate::EngineError::WorkerPoolError(
                "Engine already started".to_string(),
            ));
        }

        self.pool.start().await?;

        let scaler = ScalingController::new(
            Arc::clone(&self.pool),
            self.config_tx.subscribe(),
            self.shutdown.clone(),
        );
        let handle = tokio::spawn(scaler.run());
        *self.scaler.lock().await = Some(handle);

        info!("Engine started");
        Ok(())
    }

    /// Submit a unit of work. Returns immediately with a handle the caller
    /// can await or poll for the terminal outcome. `max_retries` defaults to
    /// the configured value.
    pub async fn submit<F, Fut>(
        &self,
        priority: i32,
        mut operation: F,
        max_retries: Option<u32>,
    ) -> crate::Result<TaskHandle>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(crate::EngineError::QueueClosed);
        }

        let max_retries = max_retries.unwrap_or_else(|| self.config_tx.borrow().max_retries);
        let boxed: Operation = Box::new(move || operation().boxed());
        let (task, handle) = Task::new(priority, boxed, max_retries);
        let id = task.id;

        self.pending.fetch_add(1, Ordering::SeqCst);
        // Emitted before the push so a fast worker cannot report the task
        // started before it was queued
        self.sink.emit(EngineEvent::Queued { id, priority });
        match self.queue.push(task).await {
            Ok(()) => Ok(handle),
            Err(rejected) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Err(rejected.error)
            }
        }
    }

    /// Atomically publish a new configuration snapshot. Subscribers apply it
    /// to future decisions only. Returns `Ok(false)` without publishing when
    /// the snapshot equals the current one.
    pub fn update_config(&self, mut new: EngineConfig) -> crate::Result<bool> {
        new.validate()?;

        let next_version = {
            let current = self.config_tx.borrow();
            if *current == new {
                debug!("Ignoring identical configuration snapshot");
                return Ok(false);
            }
            current.version + 1
        };

        new.version = next_version;
        self.config_tx.send_replace(new);
        info!("Configuration updated to version {}", next_version);
        Ok(true)
    }

    /// Current configuration snapshot
    pub fn config(&self) -> EngineConfig {
        self.config_tx.borrow().clone()
    }

    /// Watch future configuration snapshots
    pub fn subscribe(&self) -> watch::Receiver<EngineConfig> {
        self.config_tx.subscribe()
    }

    /// The breaker guarding task execution
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Tasks submitted but not yet terminally resolved
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Current worker count
    pub async fn worker_count(&self) -> usize {
        self.pool.worker_count().await
    }

    /// Point-in-time queue depth
    pub async fn queue_len(&self) -> usize {
        self.queue.len().await
    }

    /// Graceful shutdown: refuse new submissions, interrupt retry sleeps,
    /// resolve unclaimed tasks as `Cancelled`, give in-flight executions the
    /// configured grace period, then force-stop whatever remains.
    pub async fn shutdown(&self) -> crate::Result<()> {
        info!("Initiating graceful shutdown...");

        self.queue.close().await;
        self.shutdown.cancel();

        for mut task in self.queue.drain().await {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            task.resolve(Err(TaskFailure::Cancelled));
        }

        if let Some(handle) = self.scaler.lock().await.take() {
            let _ = handle.await;
        }

        let grace = self.config_tx.borrow().shutdown_grace();
        self.pool.join_all(grace).await
    }
}
