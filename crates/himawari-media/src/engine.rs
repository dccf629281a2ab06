//! Execution engine: preset materialization and tool invocation for a task.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use himawari_models::{Task, TaskId, ToolCommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::command::{ProcessLauncher, ToolInvocation};
use crate::error::{MediaError, MediaResult};
use crate::preset::PresetFile;

/// Outcome of a successful tool run.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Exact command line that was run
    pub invocation: String,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

/// Runs tasks through the external tool.
///
/// Output artifacts land in `work_dir` as `{task-id}.mp4`, so distinct
/// tasks never collide and orphans are recognizable after a crash.
#[derive(Clone)]
pub struct TranscodeEngine {
    launcher: Arc<dyn ProcessLauncher>,
    work_dir: PathBuf,
    /// Executable used for [`ToolCommand::Ffmpeg`]
    program: PathBuf,
    /// Where preset files go; system temp dir when `None`
    preset_dir: Option<PathBuf>,
}

impl TranscodeEngine {
    pub fn new(
        work_dir: impl Into<PathBuf>,
        program: impl Into<PathBuf>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            launcher,
            work_dir: work_dir.into(),
            program: program.into(),
            preset_dir: None,
        }
    }

    /// Write preset files into `dir` instead of the system temp dir.
    pub fn with_preset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.preset_dir = Some(dir.into());
        self
    }

    /// Deterministic output path for a task.
    ///
    /// Ids that would escape the working directory are rejected.
    pub fn output_path(&self, id: &TaskId) -> MediaResult<PathBuf> {
        let file_name = id.artifact_file_name();
        let mut components = Path::new(&file_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.work_dir.join(file_name)),
            _ => Err(MediaError::InvalidTaskId(id.to_string())),
        }
    }

    /// Materialize the task's preset payload as a temp file.
    pub async fn prepare_preset(&self, task: &Task) -> MediaResult<PresetFile> {
        PresetFile::write(task.preset_data().to_string(), self.preset_dir.clone()).await
    }

    /// Build the command line for a task without running it.
    pub fn invocation(
        &self,
        task: &Task,
        preset: &PresetFile,
        output: &Path,
    ) -> MediaResult<ToolInvocation> {
        let program = match task.tool() {
            Ok(ToolCommand::Ffmpeg) => &self.program,
            Err(unsupported) => return Err(MediaError::UnsupportedCommand(unsupported.0)),
        };

        Ok(ToolInvocation::new(program, output)
            .task_args(task.args().iter().cloned())
            .preset(preset.path()))
    }

    /// Run the tool for `task`, writing to `output`.
    ///
    /// Fails closed: an unrecognized command is rejected before anything
    /// is launched.
    pub async fn execute(
        &self,
        task: &Task,
        preset: &PresetFile,
        output: &Path,
        cancel: &CancellationToken,
    ) -> MediaResult<ExecutionReport> {
        let invocation = self.invocation(task, preset, output)?;
        let rendered = invocation.to_string();

        debug!(task_id = %task.id(), invocation = %rendered, "Launching tool");
        let started = Instant::now();
        self.launcher.launch(&invocation, cancel).await?;
        let elapsed = started.elapsed();

        info!(
            task_id = %task.id(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Tool finished"
        );

        Ok(ExecutionReport {
            invocation: rendered,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records invocations instead of spawning anything.
    #[derive(Default)]
    struct SpyLauncher {
        launched: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl ProcessLauncher for SpyLauncher {
        async fn launch(
            &self,
            invocation: &ToolInvocation,
            _cancel: &CancellationToken,
        ) -> MediaResult<()> {
            let mut line = vec![invocation.program().display().to_string()];
            line.extend(invocation.build_args());
            self.launched.lock().unwrap().push(line);
            Ok(())
        }
    }

    fn engine(dir: &TempDir, spy: Arc<SpyLauncher>) -> TranscodeEngine {
        TranscodeEngine::new(dir.path().join("out"), "ffmpeg", spy).with_preset_dir(dir.path())
    }

    #[tokio::test]
    async fn test_execute_appends_preset_and_output() {
        let dir = TempDir::new().unwrap();
        let spy = Arc::new(SpyLauncher::default());
        let engine = engine(&dir, spy.clone());

        let task = Task::new("abc", "ffmpeg")
            .unwrap()
            .with_args(["-i", "in.mp4"])
            .with_preset_data("x=1");
        let preset = engine.prepare_preset(&task).await.unwrap();
        assert_eq!(std::fs::read_to_string(preset.path()).unwrap(), "x=1");

        let output = engine.output_path(task.id()).unwrap();
        assert_eq!(output, dir.path().join("out").join("abc.mp4"));

        let report = engine
            .execute(&task, &preset, &output, &CancellationToken::new())
            .await
            .unwrap();

        let preset_arg = preset.path().display().to_string();
        let output_arg = output.display().to_string();
        let launched = spy.launched.lock().unwrap();
        assert_eq!(
            launched.as_slice(),
            [vec![
                "ffmpeg".to_string(),
                "-i".to_string(),
                "in.mp4".to_string(),
                "-fpre".to_string(),
                preset_arg.clone(),
                output_arg.clone(),
            ]]
        );
        assert_eq!(
            report.invocation,
            format!("ffmpeg -i in.mp4 -fpre {} {}", preset_arg, output_arg)
        );
    }

    #[tokio::test]
    async fn test_unsupported_command_never_launches() {
        let dir = TempDir::new().unwrap();
        let spy = Arc::new(SpyLauncher::default());
        let engine = engine(&dir, spy.clone());

        for command in ["", "sh", "FFMPEG", "ffprobe", "rm"] {
            let task = Task::new("abc", command).unwrap().with_args(["-rf", "/"]);
            let preset = engine.prepare_preset(&task).await.unwrap();
            let output = engine.output_path(task.id()).unwrap();

            let err = engine
                .execute(&task, &preset, &output, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(
                matches!(err, MediaError::UnsupportedCommand(ref c) if c == command),
                "command {command:?}: {err}"
            );
        }

        assert!(spy.launched.lock().unwrap().is_empty());
    }

    #[test]
    fn test_output_path_rejects_escaping_ids() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Arc::new(SpyLauncher::default()));

        for id in ["../evil", "a/b", "/abs"] {
            let err = engine.output_path(&TaskId::from_string(id)).unwrap_err();
            assert!(matches!(err, MediaError::InvalidTaskId(_)), "id {id}");
        }

        assert!(engine.output_path(&TaskId::from_string("1f6c-22")).is_ok());
    }
}
