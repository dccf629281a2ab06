//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use himawari_client::CoordinatorConfig;

use crate::error::{WorkerError, WorkerResult};

/// CPU cores budgeted for one tool process.
pub const CORES_PER_SLOT: usize = 8;

/// Pool size for a machine with `cpus` cores. Never zero.
pub fn pool_size_for(cpus: usize) -> usize {
    (cpus / CORES_PER_SLOT).max(1)
}

fn default_pool_size() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    pool_size_for(cpus)
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Coordinator `host[:port]` or URL; required
    pub coordinator: String,
    /// Directory for output artifacts
    pub work_dir: PathBuf,
    /// Maximum concurrent task pipelines
    pub pool_size: usize,
    /// Poll interval after a successful acquisition
    pub backoff_default: Duration,
    /// Upper bound for the poll interval
    pub backoff_max: Duration,
    /// Ceiling for one tool run
    pub command_timeout: Duration,
    /// How long to wait for in-flight pipelines on shutdown
    pub shutdown_timeout: Duration,
    /// Timeout for one acquire call
    pub acquire_timeout: Duration,
    /// Timeout for one upload
    pub upload_timeout: Duration,
    /// Executable run for the `ffmpeg` command
    pub ffmpeg_path: PathBuf,
    /// Forward tool stdout/stderr instead of discarding them
    pub inherit_tool_output: bool,
    /// Serve Prometheus metrics on this address when set
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            coordinator: String::new(),
            work_dir: PathBuf::from("/tmp"),
            pool_size: default_pool_size(),
            backoff_default: Duration::from_secs(1),
            backoff_max: Duration::from_secs(1000),
            command_timeout: Duration::from_secs(24 * 60 * 60), // 24 hours
            shutdown_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(10),
            upload_timeout: Duration::from_secs(3600), // 1 hour
            ffmpeg_path: PathBuf::from("ffmpeg"),
            inherit_tool_output: false,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    ///
    /// Unparseable values fall back to the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let defaults = Self::default();

        Self {
            coordinator: lookup("HIMAWARI_COORDINATOR").unwrap_or(defaults.coordinator),
            work_dir: lookup("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            pool_size: parse_value(&lookup, "WORKER_POOL_SIZE").unwrap_or(defaults.pool_size),
            backoff_default: parse("WORKER_BACKOFF_DEFAULT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_default),
            backoff_max: parse("WORKER_BACKOFF_MAX_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.backoff_max),
            command_timeout: parse("WORKER_COMMAND_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.command_timeout),
            shutdown_timeout: parse("WORKER_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            acquire_timeout: parse("COORDINATOR_ACQUIRE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
            upload_timeout: parse("COORDINATOR_UPLOAD_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.upload_timeout),
            ffmpeg_path: lookup("WORKER_FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            inherit_tool_output: parse_value(&lookup, "WORKER_INHERIT_TOOL_OUTPUT")
                .unwrap_or(defaults.inherit_tool_output),
            metrics_addr: parse_value(&lookup, "WORKER_METRICS_ADDR").or(defaults.metrics_addr),
        }
    }

    /// Apply command-line positional arguments, which win over the
    /// environment.
    pub fn with_cli(mut self, coordinator: Option<String>, work_dir: Option<PathBuf>) -> Self {
        if let Some(coordinator) = coordinator {
            self.coordinator = coordinator;
        }
        if let Some(work_dir) = work_dir {
            self.work_dir = work_dir;
        }
        self
    }

    /// Check the configuration once at startup.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.coordinator.trim().is_empty() {
            return Err(WorkerError::config_error(
                "coordinator address is required (first argument or HIMAWARI_COORDINATOR)",
            ));
        }
        if self.pool_size == 0 {
            return Err(WorkerError::config_error("pool size must be at least 1"));
        }
        if self.backoff_default.is_zero() {
            return Err(WorkerError::config_error("default backoff must be positive"));
        }
        if self.backoff_max < self.backoff_default {
            return Err(WorkerError::config_error(format!(
                "backoff ceiling {:?} is below the default interval {:?}",
                self.backoff_max, self.backoff_default
            )));
        }
        self.coordinator_config()
            .base_url()
            .map_err(|e| WorkerError::config_error(e.to_string()))?;
        Ok(())
    }

    /// Client settings derived from this config.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            address: self.coordinator.clone(),
            acquire_timeout: self.acquire_timeout,
            upload_timeout: self.upload_timeout,
            threads_hint: self.pool_size,
        }
    }
}

fn parse_value<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}
