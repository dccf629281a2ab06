//! Error types for tool execution.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while preparing or running the external tool.
///
/// Every variant that concerns a launched (or attempted) process carries
/// the exact invocation string so a failure can be reproduced by hand.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("unsupported command {0:?}, refusing to spawn")]
    UnsupportedCommand(String),

    #[error("task id {0:?} is not a plain file name")]
    InvalidTaskId(String),

    #[error("failed to spawn `{invocation}`: {source}")]
    SpawnFailed {
        invocation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{invocation}` exited with {}", describe_exit(.exit_code))]
    ToolFailed {
        invocation: String,
        exit_code: Option<i32>,
    },

    #[error("`{invocation}` cancelled by shutdown")]
    Cancelled { invocation: String },

    #[error("`{invocation}` timed out after {secs} seconds")]
    Timeout { invocation: String, secs: u64 },

    #[error("failed to write preset file: {0}")]
    PresetWrite(#[source] std::io::Error),

    #[error("working directory {path} is unusable: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

impl MediaError {
    /// Create a tool failure error.
    pub fn tool_failed(invocation: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::ToolFailed {
            invocation: invocation.into(),
            exit_code,
        }
    }

    /// The invocation string, if this error concerns a process.
    pub fn invocation(&self) -> Option<&str> {
        match self {
            MediaError::SpawnFailed { invocation, .. }
            | MediaError::ToolFailed { invocation, .. }
            | MediaError::Cancelled { invocation }
            | MediaError::Timeout { invocation, .. } => Some(invocation),
            _ => None,
        }
    }

    /// True for failures local to the filesystem rather than the tool.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            MediaError::PresetWrite(_) | MediaError::WorkDir { .. } | MediaError::Io(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled { .. })
    }
}
