//! Worker-pool scheduler.
//!
//! One control loop admits a slot, asks the coordinator for a task and
//! hands it to a pipeline running on its own tokio task. The slot is held
//! until that pipeline finishes, so at most `pool_size` pipelines run at
//! once. Between polls the loop sleeps for the current backoff interval.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use himawari_client::{ClientResult, CoordinatorClient};
use himawari_models::Task;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, FailureTracker};
use crate::config::WorkerConfig;
use crate::error::{FailureKind, WorkerError};
use crate::metrics;

/// Consecutive transport failures logged before the rest are suppressed.
const MAX_LOGGED_ACQUIRE_FAILURES: u32 = 5;

/// Where tasks come from.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn acquire(&self) -> ClientResult<Task>;
}

#[async_trait]
impl TaskSource for CoordinatorClient {
    async fn acquire(&self) -> ClientResult<Task> {
        self.acquire_task().await
    }
}

/// Runs one acquired task to completion.
///
/// Implementations own all error handling and cleanup for the task; the
/// scheduler only learns that the pipeline ended.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: Task, cancel: CancellationToken);
}

/// Counters reported when the pool stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSummary {
    /// Tasks acquired and dispatched
    pub acquired: u64,
    /// Polls answered with no work
    pub no_work: u64,
    /// Tasks discarded as unusable
    pub protocol_violations: u64,
    /// Polls that failed in transport
    pub transport_errors: u64,
    /// Pipelines still running when the shutdown timeout elapsed
    pub abandoned: usize,
}

impl PoolSummary {
    fn count_failure(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::NoWorkAvailable => self.no_work += 1,
            FailureKind::ProtocolViolation => self.protocol_violations += 1,
            _ => self.transport_errors += 1,
        }
    }
}

/// Bounded pool of task pipelines fed by a polling loop.
pub struct WorkerPool {
    source: Arc<dyn TaskSource>,
    handler: Arc<dyn TaskHandler>,
    pool_size: usize,
    slots: Arc<Semaphore>,
    backoff_default: Duration,
    backoff_max: Duration,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    pub fn new(
        config: &WorkerConfig,
        source: Arc<dyn TaskSource>,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        let pool_size = config.pool_size.max(1);
        Self {
            source,
            handler,
            pool_size,
            slots: Arc::new(Semaphore::new(pool_size)),
            backoff_default: config.backoff_default,
            backoff_max: config.backoff_max,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of pipelines currently holding a slot.
    pub fn slots_in_use(&self) -> usize {
        self.pool_size - self.slots.available_permits()
    }

    /// Poll and dispatch until `cancel` fires, then wait for in-flight
    /// pipelines to drain (bounded by the shutdown timeout).
    pub async fn run(&self, cancel: CancellationToken) -> PoolSummary {
        info!(
            pool_size = self.pool_size,
            backoff_default_ms = self.backoff_default.as_millis() as u64,
            backoff_max_secs = self.backoff_max.as_secs(),
            "Starting worker pool"
        );

        let tracker = TaskTracker::new();
        let mut backoff = Backoff::new(self.backoff_default, self.backoff_max);
        let mut failures = FailureTracker::new(MAX_LOGGED_ACQUIRE_FAILURES);
        let mut summary = PoolSummary::default();

        loop {
            // Admit
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            // Acquire
            let acquired = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.source.acquire() => result,
            };

            // Backoff update
            let interval = match acquired {
                Ok(task) => {
                    summary.acquired += 1;
                    failures.record_success();
                    metrics::record_acquire("task");
                    self.dispatch(&tracker, task, permit, &cancel);
                    backoff.on_success()
                }
                Err(e) => {
                    drop(permit);
                    let err = WorkerError::from(e);
                    let kind = err.kind();
                    summary.count_failure(kind);
                    metrics::record_acquire(kind.as_str());
                    log_acquire_failure(&err, kind, &mut failures);
                    backoff.on_failure()
                }
            };
            metrics::set_backoff_seconds(interval.as_secs_f64());

            // Wait
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Shutdown requested, no new tasks will be acquired");
        summary.abandoned = self.drain(&tracker).await;
        summary
    }

    fn dispatch(
        &self,
        tracker: &TaskTracker,
        task: Task,
        permit: OwnedSemaphorePermit,
        cancel: &CancellationToken,
    ) {
        debug!(task_id = %task.id(), "Dispatching task");

        let handler = Arc::clone(&self.handler);
        let slots = Arc::clone(&self.slots);
        let pool_size = self.pool_size;
        let cancel = cancel.clone();

        tracker.spawn(async move {
            handler.handle(task, cancel).await;
            drop(permit);
            metrics::set_slots_in_use(pool_size - slots.available_permits());
        });
        metrics::set_slots_in_use(self.slots_in_use());
    }

    /// Wait for dispatched pipelines. Returns how many were still running
    /// when the timeout elapsed.
    async fn drain(&self, tracker: &TaskTracker) -> usize {
        tracker.close();
        if tracker.is_empty() {
            return 0;
        }

        info!(in_flight = tracker.len(), "Waiting for in-flight tasks to finish");
        match tokio::time::timeout(self.shutdown_timeout, tracker.wait()).await {
            Ok(()) => 0,
            Err(_) => {
                let remaining = tracker.len();
                warn!(
                    remaining,
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "Shutdown timeout elapsed with tasks still running"
                );
                remaining
            }
        }
    }
}

fn log_acquire_failure(err: &WorkerError, kind: FailureKind, failures: &mut FailureTracker) {
    match kind {
        FailureKind::NoWorkAvailable => {
            failures.record_success();
            debug!(error = %err, "No work available");
        }
        FailureKind::ProtocolViolation => {
            failures.record_success();
            warn!(error = %err, "Discarding unusable task from coordinator");
        }
        _ => {
            if failures.record_failure() {
                warn!(error = %err, kind = %kind, "Task acquisition failed");
            }
        }
    }
}
