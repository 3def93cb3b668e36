//! Configuration snapshots
//!
//! An [`EngineConfig`] is an immutable snapshot of every live tunable in the
//! engine. Snapshots are replaced atomically through a watch channel; a
//! decision already in progress keeps using the snapshot it captured at entry.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// What a worker does with a task the circuit breaker refuses to admit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitPolicy {
    /// Resolve the task with `CircuitOpen` immediately (default)
    #[default]
    FailFast,
    /// Push the task back onto the queue for a later attempt
    Requeue,
}

/// Snapshot of the engine's tunables.
///
/// `version` increases monotonically with each published change and is
/// excluded from equality, so republishing an identical snapshot is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Consecutive failures that trip the breaker open
    pub failure_threshold: u32,

    /// Successful half-open probes required to close the breaker
    pub success_threshold: u32,

    /// How long the breaker stays open before admitting a probe, in ms
    pub cooldown_ms: u64,

    /// Default maximum retry attempts for submitted tasks
    pub max_retries: u32,

    /// Base delay before the first retry, in ms
    pub initial_backoff_ms: u64,

    /// Ceiling on the exponential backoff delay, in ms
    pub max_backoff_ms: u64,

    /// Worker pool floor
    pub min_workers: usize,

    /// Worker pool ceiling
    pub max_workers: usize,

    /// Scale up when pending > factor x workers
    pub scale_up_factor: usize,

    /// Scaling controller tick interval, in ms
    pub scale_interval_ms: u64,

    /// Maximum number of queued tasks before submissions are refused
    pub max_queue_size: usize,

    /// Policy applied to breaker-rejected tasks
    pub circuit_policy: CircuitPolicy,

    /// Graceful shutdown grace period in seconds
    pub shutdown_grace_secs: u64,

    /// Snapshot version, assigned by the publisher
    #[serde(skip)]
    pub version: u64,
}

impl PartialEq for EngineConfig {
    fn eq(&self, other: &Self) -> bool {
        // Version is publisher bookkeeping, not a tunable
        self.failure_threshold == other.failure_threshold
            && self.success_threshold == other.success_threshold
            && self.cooldown_ms == other.cooldown_ms
            && self.max_retries == other.max_retries
            && self.initial_backoff_ms == other.initial_backoff_ms
            && self.max_backoff_ms == other.max_backoff_ms
            && self.min_workers == other.min_workers
            && self.max_workers == other.max_workers
            && self.scale_up_factor == other.scale_up_factor
            && self.scale_interval_ms == other.scale_interval_ms
            && self.max_queue_size == other.max_queue_size
            && self.circuit_policy == other.circuit_policy
            && self.shutdown_grace_secs == other.shutdown_grace_secs
    }
}

impl Eq for EngineConfig {}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            cooldown_ms: 30_000,
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
            min_workers: 2,
            max_workers: num_cpus() * 2,
            scale_up_factor: 2,
            scale_interval_ms: 1_000,
            max_queue_size: 10_000,
            circuit_policy: CircuitPolicy::FailFast,
            shutdown_grace_secs: 30,
            version: 0,
        }
    }
}

impl EngineConfig {
    /// Load configuration from file, environment variables, or defaults
    pub fn load() -> crate::Result<Self> {
        if let Ok(config_path) = env::var("TASK_ENGINE_CONFIG") {
            info!("Loading config from TASK_ENGINE_CONFIG: {}", config_path);
            return Self::from_file(&config_path);
        }

        let default_paths = vec![
            "engine.yaml",
            "engine.toml",
            "config/engine.yaml",
            "config/engine.toml",
        ];

        for path in default_paths {
            if Path::new(path).exists() {
                info!("Loading config from: {}", path);
                return Self::from_file(path);
            }
        }

        if let Ok(config) = Self::from_env() {
            info!("Loaded config from environment variables");
            return Ok(config);
        }

        warn!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a file (YAML or TOML)
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .map_err(|e| {
                crate::EngineError::ConfigError(format!("Failed to load config file: {}", e))
            })?;

        let config: EngineConfig = settings
            .try_deserialize()
            .map_err(|e| crate::EngineError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `TASK_ENGINE_*` environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();
        let mut found_any = false;

        found_any |= env_override("TASK_ENGINE_FAILURE_THRESHOLD", &mut config.failure_threshold)?;
        found_any |= env_override("TASK_ENGINE_SUCCESS_THRESHOLD", &mut config.success_threshold)?;
        found_any |= env_override("TASK_ENGINE_COOLDOWN_MS", &mut config.cooldown_ms)?;
        found_any |= env_override("TASK_ENGINE_MAX_RETRIES", &mut config.max_retries)?;
        found_any |= env_override("TASK_ENGINE_INITIAL_BACKOFF_MS", &mut config.initial_backoff_ms)?;
        found_any |= env_override("TASK_ENGINE_MAX_BACKOFF_MS", &mut config.max_backoff_ms)?;
        found_any |= env_override("TASK_ENGINE_MIN_WORKERS", &mut config.min_workers)?;
        found_any |= env_override("TASK_ENGINE_MAX_WORKERS", &mut config.max_workers)?;
        found_any |= env_override("TASK_ENGINE_SCALE_UP_FACTOR", &mut config.scale_up_factor)?;
        found_any |= env_override("TASK_ENGINE_SCALE_INTERVAL_MS", &mut config.scale_interval_ms)?;
        found_any |= env_override("TASK_ENGINE_MAX_QUEUE_SIZE", &mut config.max_queue_size)?;
        found_any |= env_override(
            "TASK_ENGINE_SHUTDOWN_GRACE_SECS",
            &mut config.shutdown_grace_secs,
        )?;

        if let Ok(val) = env::var("TASK_ENGINE_CIRCUIT_POLICY") {
            config.circuit_policy = match val.to_lowercase().as_str() {
                "fail_fast" | "failfast" => CircuitPolicy::FailFast,
                "requeue" => CircuitPolicy::Requeue,
                _ => {
                    return Err(crate::EngineError::ConfigError(format!(
                        "Invalid CIRCUIT_POLICY: {}",
                        val
                    )))
                }
            };
            found_any = true;
        }

        if !found_any {
            return Err(crate::EngineError::ConfigError(
                "No environment variables found".to_string(),
            ));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.min_workers == 0 {
            return Err(crate::EngineError::ConfigError(
                "min_workers must be greater than 0".to_string(),
            ));
        }

        if self.max_workers < self.min_workers {
            return Err(crate::EngineError::ConfigError(
                "max_workers must be >= min_workers".to_string(),
            ));
        }

        if self.failure_threshold == 0 || self.success_threshold == 0 {
            return Err(crate::EngineError::ConfigError(
                "breaker thresholds must be greater than 0".to_string(),
            ));
        }

        if self.initial_backoff_ms == 0 {
            return Err(crate::EngineError::ConfigError(
                "initial_backoff_ms must be greater than 0".to_string(),
            ));
        }

        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(crate::EngineError::ConfigError(
                "max_backoff_ms must be >= initial_backoff_ms".to_string(),
            ));
        }

        if self.scale_up_factor == 0 || self.scale_interval_ms == 0 {
            return Err(crate::EngineError::ConfigError(
                "scaling parameters must be greater than 0".to_string(),
            ));
        }

        if self.max_queue_size == 0 {
            return Err(crate::EngineError::ConfigError(
                "max_queue_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Breaker cooldown period
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Base retry backoff delay
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Retry backoff ceiling
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Scaling controller tick interval
    pub fn scale_interval(&self) -> Duration {
        Duration::from_millis(self.scale_interval_ms)
    }

    /// Shutdown grace period
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Overwrite `slot` from an environment variable if it is set. Returns
/// whether the variable was present.
fn env_override<T: FromStr>(key: &str, slot: &mut T) -> crate::Result<bool>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => {
            *slot = val
                .parse()
                .map_err(|e| crate::EngineError::ConfigError(format!("Invalid {}: {}", key, e)))?;
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
