//! Task descriptor handed out by the coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{TaskDecodeError, TaskDecodeResult};
use crate::tool::{ToolCommand, UnsupportedCommand, OUTPUT_EXTENSION};

/// Unique identifier for a task, assigned by the coordinator.
///
/// Never empty once constructed through [`Task::decode`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the output artifact for this task, e.g. `abc.mp4`.
    pub fn artifact_file_name(&self) -> String {
        format!("{}{}", self.0, OUTPUT_EXTENSION)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of work.
///
/// Immutable once decoded; fields are only reachable through accessors.
/// Serializes to the same PascalCase shape the coordinator sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    #[serde(rename = "Id")]
    id: TaskId,
    #[serde(rename = "Size")]
    size: i64,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "PresetData")]
    preset_data: String,
    #[serde(rename = "Command")]
    command: String,
    #[serde(rename = "Args")]
    args: Vec<String>,
}

/// Wire shape of the acquire response before validation.
///
/// Everything is optional here so that a missing field can be told apart
/// from a malformed body; `null` is treated like an absent field.
#[derive(Debug, Deserialize)]
struct TaskPayload {
    #[serde(rename = "Id", alias = "id", alias = "ID", default)]
    id: Option<String>,
    #[serde(rename = "Size", alias = "size", default)]
    size: Option<i64>,
    #[serde(rename = "Name", alias = "name", default)]
    name: Option<String>,
    #[serde(
        rename = "PresetData",
        alias = "presetData",
        alias = "preset_data",
        default
    )]
    preset_data: Option<String>,
    #[serde(rename = "Command", alias = "command", default)]
    command: Option<String>,
    #[serde(rename = "Args", alias = "args", default)]
    args: Option<Vec<String>>,
}

impl TryFrom<TaskPayload> for Task {
    type Error = TaskDecodeError;

    fn try_from(payload: TaskPayload) -> Result<Self, Self::Error> {
        let id = payload
            .id
            .filter(|id| !id.is_empty())
            .ok_or(TaskDecodeError::EmptyId)?;

        Ok(Self {
            id: TaskId(id),
            size: payload.size.unwrap_or_default(),
            name: payload.name.unwrap_or_default(),
            preset_data: payload.preset_data.unwrap_or_default(),
            command: payload.command.unwrap_or_default(),
            args: payload.args.unwrap_or_default(),
        })
    }
}

impl Task {
    /// Create a task with the given id and command and no arguments.
    ///
    /// Returns [`TaskDecodeError::EmptyId`] for an empty id, the same
    /// rule the decoder applies.
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> TaskDecodeResult<Self> {
        TaskPayload {
            id: Some(id.into()),
            size: None,
            name: None,
            preset_data: None,
            command: Some(command.into()),
            args: None,
        }
        .try_into()
    }

    /// Set the informational size hint.
    pub fn with_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the preset payload.
    pub fn with_preset_data(mut self, preset_data: impl Into<String>) -> Self {
        self.preset_data = preset_data.into();
        self
    }

    /// Set the tool arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Decode an acquire-task response body.
    ///
    /// Unknown fields are ignored. A body that is not a task object yields
    /// [`TaskDecodeError::Malformed`]; a missing or empty id yields
    /// [`TaskDecodeError::EmptyId`].
    pub fn decode(body: &[u8]) -> TaskDecodeResult<Self> {
        let payload: TaskPayload = serde_json::from_slice(body)?;
        payload.try_into()
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Expected artifact size in bytes. Informational only.
    pub fn size(&self) -> i64 {
        self.size
    }

    /// Human-readable label, used for logging.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn preset_data(&self) -> &str {
        &self.preset_data
    }

    /// Raw command name as sent by the coordinator.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Resolve the command name to a recognized tool.
    pub fn tool(&self) -> Result<ToolCommand, UnsupportedCommand> {
        self.command.parse()
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}
