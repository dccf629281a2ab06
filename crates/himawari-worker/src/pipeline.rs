//! One task's pipeline: preset, tool run, upload, cleanup.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use himawari_client::CoordinatorClient;
use himawari_media::{ensure_work_dir, ArtifactGuard, PresetFile, ToolRunner, TranscodeEngine};
use himawari_models::Task;
use tokio_util::sync::CancellationToken;
use tracing::{warn, Instrument};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::TaskLogger;
use crate::metrics;
use crate::scheduler::TaskHandler;

/// Outcome of a pipeline that made it all the way to the coordinator.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub invocation: String,
    pub tool_elapsed: Duration,
    /// Artifact bytes streamed to the coordinator
    pub bytes: u64,
}

/// Runs acquired tasks through the engine and uploads the result.
#[derive(Clone)]
pub struct TaskPipeline {
    engine: TranscodeEngine,
    client: CoordinatorClient,
}

impl TaskPipeline {
    pub fn new(engine: TranscodeEngine, client: CoordinatorClient) -> Self {
        Self { engine, client }
    }

    /// Build the engine and client described by `config`.
    ///
    /// Creates the working directory if it does not exist yet.
    pub async fn from_config(config: &WorkerConfig) -> WorkerResult<Self> {
        ensure_work_dir(&config.work_dir).await?;

        let runner = ToolRunner::new(config.command_timeout)
            .with_inherited_output(config.inherit_tool_output);
        let engine = TranscodeEngine::new(&config.work_dir, &config.ffmpeg_path, Arc::new(runner));
        let client = CoordinatorClient::new(config.coordinator_config())?;

        Ok(Self::new(engine, client))
    }

    pub fn client(&self) -> &CoordinatorClient {
        &self.client
    }

    /// Run one task end to end.
    ///
    /// The preset file and the output artifact are removed before this
    /// returns, whatever the outcome.
    pub async fn run(&self, task: &Task, cancel: &CancellationToken) -> WorkerResult<PipelineReport> {
        let output = self.engine.output_path(task.id())?;
        let preset = self.engine.prepare_preset(task).await?;
        let artifact = ArtifactGuard::new(output);

        let logger = TaskLogger::new(task);
        let result = self
            .execute_and_submit(task, &preset, artifact.path(), &logger, cancel)
            .await;

        drop(artifact);
        if let Err(e) = preset.release() {
            warn!(task_id = %task.id(), error = %e, "Preset cleanup failed");
        }
        result
    }

    async fn execute_and_submit(
        &self,
        task: &Task,
        preset: &PresetFile,
        output: &Path,
        logger: &TaskLogger,
        cancel: &CancellationToken,
    ) -> WorkerResult<PipelineReport> {
        let report = self.engine.execute(task, preset, output, cancel).await?;
        metrics::record_tool_duration(report.elapsed.as_secs_f64());
        logger.tool_finished(&report);

        let receipt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WorkerError::Cancelled("upload")),
            receipt = self.client.submit_result(task, output) => receipt?,
        };

        Ok(PipelineReport {
            invocation: report.invocation,
            tool_elapsed: report.elapsed,
            bytes: receipt.bytes,
        })
    }
}

#[async_trait]
impl TaskHandler for TaskPipeline {
    async fn handle(&self, task: Task, cancel: CancellationToken) {
        let logger = TaskLogger::new(&task);
        let span = logger.span();

        async {
            logger.acquired(&task);

            match self.run(&task, &cancel).await {
                Ok(report) => {
                    metrics::record_task_completed();
                    metrics::record_upload_bytes(report.bytes);
                    logger.completed(&report);
                }
                Err(e) => {
                    metrics::record_task_failed(e.kind());
                    logger.failed(&e);
                }
            }
        }
        .instrument(span)
        .await
    }
}
