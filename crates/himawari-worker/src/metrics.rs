//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::error::{FailureKind, WorkerError, WorkerResult};

/// Install the Prometheus recorder and serve it over HTTP on `addr`.
///
/// Must be called from within a tokio runtime. Without a recorder every
/// `record_*` call is a no-op.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("failed to start metrics exporter: {e}")))?;
    info!(%addr, "Prometheus metrics enabled");
    Ok(())
}

/// Metric names as constants for consistency.
pub mod names {
    pub const ACQUIRE_TOTAL: &str = "himawari_acquire_total";
    pub const TASKS_COMPLETED_TOTAL: &str = "himawari_tasks_completed_total";
    pub const TASKS_FAILED_TOTAL: &str = "himawari_tasks_failed_total";
    pub const SLOTS_IN_USE: &str = "himawari_slots_in_use";
    pub const BACKOFF_SECONDS: &str = "himawari_backoff_seconds";
    pub const TOOL_DURATION_SECONDS: &str = "himawari_tool_duration_seconds";
    pub const UPLOAD_BYTES_TOTAL: &str = "himawari_upload_bytes_total";
}

/// Record one acquisition attempt. `outcome` is `"task"` or a failure kind.
pub fn record_acquire(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::ACQUIRE_TOTAL, &labels).increment(1);
}

pub fn record_task_completed() {
    counter!(names::TASKS_COMPLETED_TOTAL).increment(1);
}

pub fn record_task_failed(kind: FailureKind) {
    let labels = [("kind", kind.as_str().to_string())];
    counter!(names::TASKS_FAILED_TOTAL, &labels).increment(1);
}

/// Update the slots-in-use gauge.
pub fn set_slots_in_use(count: usize) {
    gauge!(names::SLOTS_IN_USE).set(count as f64);
}

/// Update the current poll interval gauge.
pub fn set_backoff_seconds(secs: f64) {
    gauge!(names::BACKOFF_SECONDS).set(secs);
}

pub fn record_tool_duration(duration_secs: f64) {
    histogram!(names::TOOL_DURATION_SECONDS).record(duration_secs);
}

pub fn record_upload_bytes(bytes: u64) {
    counter!(names::UPLOAD_BYTES_TOTAL).increment(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_acquire("task");
        record_acquire(FailureKind::NoWorkAvailable.as_str());
        record_task_completed();
        record_task_failed(FailureKind::ExecutionFailure);
        set_slots_in_use(2);
        set_backoff_seconds(4.0);
        record_tool_duration(1.5);
        record_upload_bytes(1024);
    }

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            names::ACQUIRE_TOTAL,
            names::TASKS_COMPLETED_TOTAL,
            names::TASKS_FAILED_TOTAL,
            names::SLOTS_IN_USE,
            names::BACKOFF_SECONDS,
            names::TOOL_DURATION_SECONDS,
            names::UPLOAD_BYTES_TOTAL,
        ] {
            assert!(name.starts_with("himawari_"), "{name}");
        }
    }
}
