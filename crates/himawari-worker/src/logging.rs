//! Structured task logging.
//!
//! Every line emitted for a task carries the task id and the task's
//! display name, one method per stage of the pipeline.

use himawari_media::ExecutionReport;
use himawari_models::{Task, TaskId};
use tracing::{error, info, warn, Span};

use crate::error::{FailureKind, WorkerError};
use crate::pipeline::PipelineReport;

/// Logs the stages of one task's pipeline.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: TaskId,
    name: String,
}

impl TaskLogger {
    pub fn new(task: &Task) -> Self {
        Self {
            task_id: task.id().clone(),
            name: task.name().to_string(),
        }
    }

    /// Span wrapping everything done for this task.
    pub fn span(&self) -> Span {
        tracing::info_span!("task", task_id = %self.task_id, task_name = %self.name)
    }

    pub fn acquired(&self, task: &Task) {
        info!(
            task_id = %self.task_id,
            task_name = %self.name,
            command = task.command(),
            args = task.args().len(),
            size_hint = task.size(),
            "Task acquired"
        );
    }

    /// The tool exited cleanly; the upload starts next.
    pub fn tool_finished(&self, report: &ExecutionReport) {
        info!(
            task_id = %self.task_id,
            task_name = %self.name,
            elapsed_secs = report.elapsed.as_secs_f64(),
            invocation = %report.invocation,
            "Tool finished, uploading artifact"
        );
    }

    pub fn completed(&self, report: &PipelineReport) {
        info!(
            task_id = %self.task_id,
            task_name = %self.name,
            tool_secs = report.tool_elapsed.as_secs_f64(),
            bytes = report.bytes,
            "Task completed"
        );
    }

    /// Cancellation is expected during shutdown and logs as a warning;
    /// execution failures carry the exact command line.
    pub fn failed(&self, err: &WorkerError) {
        let kind = err.kind();
        match (kind, err.invocation()) {
            (FailureKind::Cancelled, _) => warn!(
                task_id = %self.task_id,
                task_name = %self.name,
                error = %err,
                "Task cancelled"
            ),
            (_, Some(invocation)) => error!(
                task_id = %self.task_id,
                task_name = %self.name,
                kind = kind.as_str(),
                invocation,
                error = %err,
                "Task failed"
            ),
            (_, None) => error!(
                task_id = %self.task_id,
                task_name = %self.name,
                kind = kind.as_str(),
                error = %err,
                "Task failed"
            ),
        }
    }
}
