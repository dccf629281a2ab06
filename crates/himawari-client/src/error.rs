//! Coordinator client error types.

use std::time::Duration;

use himawari_models::TaskDecodeError;
use reqwest::StatusCode;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The coordinator answered the acquire call with something other than
    /// 200. Expected; drives backoff.
    #[error("no work available (status {0})")]
    NoWork(StatusCode),

    /// The acquire response was 200 but not a usable task.
    #[error("protocol violation: {0}")]
    Protocol(#[from] TaskDecodeError),

    #[error("invalid coordinator address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },

    /// The submit call completed with a non-200 status.
    #[error("bad status: {0}")]
    UploadRejected(String),

    /// Reading the artifact for upload failed; the request body was cut
    /// short with an error rather than silently truncated.
    #[error("artifact stream failed: {0}")]
    Artifact(#[source] std::io::Error),

    /// The upload, including forwarding the artifact, outlived its
    /// timeout.
    #[error("upload timed out after {0:?}")]
    UploadTimedOut(Duration),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ClientError {
    pub fn is_no_work(&self) -> bool {
        matches!(self, ClientError::NoWork(_))
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, ClientError::Protocol(_))
    }

    /// True when the failure came from reading the local artifact.
    pub fn is_artifact(&self) -> bool {
        matches!(self, ClientError::Artifact(_))
    }
}
