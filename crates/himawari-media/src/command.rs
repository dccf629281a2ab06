//! External tool invocation builder and runner.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use himawari_models::PRESET_FLAG;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// Hard ceiling for a single tool run, independent of shutdown.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Builder for one tool command line.
///
/// Argument order is fixed: task arguments, then the preset reference,
/// then the output path as the final argument.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Executable to run
    program: PathBuf,
    /// Arguments supplied by the task, passed verbatim
    task_args: Vec<String>,
    /// Preset side-input, referenced as `-fpre <path>`
    preset: Option<PathBuf>,
    /// Output file path
    output: PathBuf,
}

impl ToolInvocation {
    /// Create a new invocation of `program` writing to `output`.
    pub fn new(program: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            task_args: Vec::new(),
            preset: None,
            output: output.as_ref().to_path_buf(),
        }
    }

    /// Add task arguments.
    pub fn task_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Reference a preset file.
    pub fn preset(mut self, path: impl AsRef<Path>) -> Self {
        self.preset = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments (without the program).
    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.task_args.clone();

        if let Some(ref preset) = self.preset {
            args.push(PRESET_FLAG.to_string());
            args.push(preset.to_string_lossy().to_string());
        }

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

impl fmt::Display for ToolInvocation {
    /// Shell-like rendering used in logs and errors.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in self.build_args() {
            if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Something that can run a tool invocation to completion.
///
/// The engine only talks to this seam, so tests can observe whether a
/// process would have been spawned.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Run the invocation. Must return promptly once `cancel` fires.
    async fn launch(&self, invocation: &ToolInvocation, cancel: &CancellationToken)
        -> MediaResult<()>;
}

/// Runner for tool processes with a ceiling timeout and cancellation.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    /// Ceiling for a single run
    timeout: Duration,
    /// Forward the tool's stdout/stderr instead of discarding them
    inherit_output: bool,
}

impl Default for ToolRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT)
    }
}

impl ToolRunner {
    /// Create a runner with the given ceiling timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            inherit_output: false,
        }
    }

    /// Forward the tool's standard streams to ours.
    pub fn with_inherited_output(mut self, inherit: bool) -> Self {
        self.inherit_output = inherit;
        self
    }

    fn stdio(&self) -> Stdio {
        if self.inherit_output {
            Stdio::inherit()
        } else {
            Stdio::null()
        }
    }

    /// Run the invocation until exit, timeout or cancellation.
    pub async fn run(
        &self,
        invocation: &ToolInvocation,
        cancel: &CancellationToken,
    ) -> MediaResult<()> {
        let rendered = invocation.to_string();

        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled {
                invocation: rendered,
            });
        }

        debug!(invocation = %rendered, "Running tool");

        let mut child = Command::new(invocation.program())
            .args(invocation.build_args())
            .stdin(Stdio::null())
            .stdout(self.stdio())
            .stderr(self.stdio())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MediaError::SpawnFailed {
                invocation: rendered.clone(),
                source,
            })?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    Ok(())
                } else {
                    Err(MediaError::tool_failed(rendered, status.code()))
                }
            }
            _ = cancel.cancelled() => {
                info!(invocation = %rendered, "Tool cancelled, killing process");
                terminate(&mut child).await;
                Err(MediaError::Cancelled { invocation: rendered })
            }
            _ = tokio::time::sleep(self.timeout) => {
                warn!(
                    invocation = %rendered,
                    timeout_secs = self.timeout.as_secs(),
                    "Tool timed out, killing process"
                );
                terminate(&mut child).await;
                Err(MediaError::Timeout { invocation: rendered, secs: self.timeout.as_secs() })
            }
        }
    }
}

#[async_trait]
impl ProcessLauncher for ToolRunner {
    async fn launch(
        &self,
        invocation: &ToolInvocation,
        cancel: &CancellationToken,
    ) -> MediaResult<()> {
        self.run(invocation, cancel).await
    }
}

/// Kill the child and reap it so no zombie is left behind.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill tool process");
    }
}

/// Resolve `program` on `PATH` (or check it directly when it has a path).
pub fn check_tool(program: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let program = program.as_ref();
    which::which(program).map_err(|_| MediaError::ToolNotFound(program.display().to_string()))
}
