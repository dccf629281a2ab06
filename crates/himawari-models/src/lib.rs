//! Shared data models for the Himawari transcoding worker.
//!
//! This crate provides Serde-serializable types for:
//! - Tasks handed out by the coordinator
//! - The external tool a task may invoke
//! - Decode errors for malformed acquire responses

pub mod error;
pub mod task;
pub mod tool;

// Re-export common types
pub use error::{TaskDecodeError, TaskDecodeResult};
pub use task::{Task, TaskId};
pub use tool::{ToolCommand, UnsupportedCommand, OUTPUT_EXTENSION, PRESET_FLAG};
