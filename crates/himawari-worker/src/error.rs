//! Worker error types.

use std::fmt;

use himawari_client::ClientError;
use himawari_media::MediaError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Coordinator error: {0}")]
    Client(#[from] ClientError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Cancelled during {0}")]
    Cancelled(&'static str),
}

/// Failure taxonomy shared by logs and metrics.
///
/// Only [`FailureKind::Config`] is fatal to the process; everything else is
/// contained to one task pipeline or one polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Coordinator had nothing to hand out
    NoWorkAvailable,
    /// Coordinator sent an unusable task
    ProtocolViolation,
    /// Local filesystem failure (preset, artifact)
    Io,
    /// Tool could not be spawned, failed, or hit its ceiling
    ExecutionFailure,
    /// HTTP failure on either endpoint
    TransportError,
    /// Shutdown interrupted the operation
    Cancelled,
    /// Startup configuration error
    Config,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NoWorkAvailable => "no_work",
            FailureKind::ProtocolViolation => "protocol_violation",
            FailureKind::Io => "io",
            FailureKind::ExecutionFailure => "execution_failure",
            FailureKind::TransportError => "transport_error",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Config => "config",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            WorkerError::ConfigError(_) => FailureKind::Config,
            WorkerError::Cancelled(_) => FailureKind::Cancelled,
            WorkerError::Client(e) => match e {
                ClientError::NoWork(_) => FailureKind::NoWorkAvailable,
                ClientError::Protocol(_) => FailureKind::ProtocolViolation,
                ClientError::Artifact(_) => FailureKind::Io,
                ClientError::InvalidAddress { .. } => FailureKind::Config,
                ClientError::UploadRejected(_)
                | ClientError::UploadTimedOut(_)
                | ClientError::Network(_) => FailureKind::TransportError,
            },
            WorkerError::Media(e) => match e {
                MediaError::Cancelled { .. } => FailureKind::Cancelled,
                MediaError::InvalidTaskId(_) => FailureKind::ProtocolViolation,
                e if e.is_io() => FailureKind::Io,
                _ => FailureKind::ExecutionFailure,
            },
        }
    }

    /// Exact tool command line, for execution failures.
    pub fn invocation(&self) -> Option<&str> {
        match self {
            WorkerError::Media(e) => e.invocation(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use himawari_models::TaskDecodeError;

    #[test]
    fn test_client_error_kinds() {
        let no_work = WorkerError::from(ClientError::NoWork(reqwest_status(204)));
        assert_eq!(no_work.kind(), FailureKind::NoWorkAvailable);

        let protocol = WorkerError::from(ClientError::Protocol(TaskDecodeError::EmptyId));
        assert_eq!(protocol.kind(), FailureKind::ProtocolViolation);

        let rejected = WorkerError::from(ClientError::UploadRejected("500 Internal Server Error".into()));
        assert_eq!(rejected.kind(), FailureKind::TransportError);

        let timed_out = WorkerError::from(ClientError::UploadTimedOut(std::time::Duration::from_secs(3)));
        assert_eq!(timed_out.kind(), FailureKind::TransportError);

        let artifact = WorkerError::from(ClientError::Artifact(std::io::Error::other("gone")));
        assert_eq!(artifact.kind(), FailureKind::Io);
    }

    #[test]
    fn test_media_error_kinds() {
        let failed = WorkerError::from(MediaError::tool_failed("ffmpeg -i x out.mp4", Some(1)));
        assert_eq!(failed.kind(), FailureKind::ExecutionFailure);
        assert_eq!(failed.invocation(), Some("ffmpeg -i x out.mp4"));

        let unsupported = WorkerError::from(MediaError::UnsupportedCommand("sh".into()));
        assert_eq!(unsupported.kind(), FailureKind::ExecutionFailure);

        let cancelled = WorkerError::from(MediaError::Cancelled {
            invocation: "ffmpeg".into(),
        });
        assert_eq!(cancelled.kind(), FailureKind::Cancelled);

        let preset = WorkerError::from(MediaError::PresetWrite(std::io::Error::other("full")));
        assert_eq!(preset.kind(), FailureKind::Io);
        assert_eq!(preset.invocation(), None);
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(FailureKind::NoWorkAvailable.to_string(), "no_work");
        assert_eq!(WorkerError::Cancelled("upload").kind(), FailureKind::Cancelled);
        assert_eq!(WorkerError::config_error("x").kind(), FailureKind::Config);
    }

    fn reqwest_status(code: u16) -> himawari_client::StatusCode {
        himawari_client::StatusCode::from_u16(code).unwrap()
    }
}
