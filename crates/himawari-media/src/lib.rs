//! Execution engine for the external transcoding tool.
//!
//! This crate provides:
//! - Preset side-input files with guaranteed removal
//! - Type-safe tool command building
//! - A process runner with a ceiling timeout and cancellation via tokio
//! - Output artifact guards for the working directory

pub mod command;
pub mod engine;
pub mod error;
pub mod fs_utils;
pub mod preset;

pub use command::{check_tool, ProcessLauncher, ToolInvocation, ToolRunner, DEFAULT_TOOL_TIMEOUT};
pub use engine::{ExecutionReport, TranscodeEngine};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{ensure_work_dir, ArtifactGuard};
pub use preset::{PresetFile, PRESET_FILE_PREFIX};
