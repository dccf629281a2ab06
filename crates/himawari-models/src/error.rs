//! Errors raised while decoding coordinator payloads.

use thiserror::Error;

/// Result type for task decoding.
pub type TaskDecodeResult<T> = Result<T, TaskDecodeError>;

/// A coordinator response that does not describe a usable task.
///
/// Both variants are protocol violations: the worker discards the payload
/// and backs off exactly as if no work had been available.
#[derive(Debug, Error)]
pub enum TaskDecodeError {
    #[error("malformed task payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("task payload has an empty id")]
    EmptyId,
}
