//! Scaling controller
//!
//! Periodic loop that sizes the pool to the queue. Each tick it first
//! reconciles the pool against the current min/max bounds (which may have
//! just changed under live reconfiguration), then makes at most one
//! load-driven step, so a burst can never overshoot the ceiling between
//! observations.

use crate::config::EngineConfig;
use crate::worker::pool::WorkerPool;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Adjusts the worker count to the queue depth on a fixed interval
pub struct ScalingController {
    pool: Arc<WorkerPool>,
    config: watch::Receiver<EngineConfig>,
    shutdown: CancellationToken,
}

impl ScalingController {
    pub(crate) fn new(
        pool: Arc<WorkerPool>,
        config: watch::Receiver<EngineConfig>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pool,
            config,
            shutdown,
        }
    }

    /// Tick until shutdown
    pub async fn run(self) {
        let mut period = self.config.borrow().scale_interval();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Scaling controller started (interval {:?})", period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.cancelled() => break,
            }

            let cfg = self.config.borrow().clone();
            if cfg.scale_interval() != period {
                period = cfg.scale_interval();
                ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                debug!("Scaling interval changed to {:?}", period);
            }

            self.evaluate(&cfg).await;
        }

        info!("Scaling controller stopped");
    }

    /// One scaling step per tick
    async fn evaluate(&self, cfg: &EngineConfig) {
        let pending = self.pool.pending();
        let workers = self.pool.worker_count().await;

        // Bounds first: a config change may have moved the floor or ceiling
        // out from under the current pool size
        if workers < cfg.min_workers {
            self.pool.spawn_worker().await;
            return;
        }
        if workers > cfg.max_workers {
            self.pool.retire_one().await;
            return;
        }

        if pending > cfg.scale_up_factor.saturating_mul(workers) && workers < cfg.max_workers {
            debug!(
                "Scaling up: {} pending for {} workers",
                pending, workers
            );
            self.pool.spawn_worker().await;
        } else if pending * 2 < workers && workers > cfg.min_workers {
            debug!(
                "Scaling down: {} pending for {} workers",
                pending, workers
            );
            self.pool.retire_one().await;
        }
    }
}
