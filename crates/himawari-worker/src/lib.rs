//! Pull-based transcoding worker.
//!
//! This crate provides:
//! - Configuration from env and CLI
//! - Exponential backoff polling
//! - Bounded worker pool with graceful shutdown
//! - Per-task pipeline (preset, tool run, streaming upload, cleanup)
//! - Structured task logging and Prometheus metrics

pub mod backoff;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod signals;

pub use backoff::{next_interval, Backoff, FailureTracker};
pub use config::{pool_size_for, WorkerConfig};
pub use error::{FailureKind, WorkerError, WorkerResult};
pub use logging::TaskLogger;
pub use pipeline::{PipelineReport, TaskPipeline};
pub use scheduler::{PoolSummary, TaskHandler, TaskSource, WorkerPool};
pub use signals::spawn_signal_handler;
