//! External tool recognized by the worker.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Extension of every output artifact, including the leading dot.
pub const OUTPUT_EXTENSION: &str = ".mp4";

/// Flag that introduces the preset file on the tool command line.
pub const PRESET_FLAG: &str = "-fpre";

/// The tools a task is allowed to name in its `Command` field.
///
/// Only one is recognized; anything else is rejected before a process
/// is spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCommand {
    Ffmpeg,
}

impl ToolCommand {
    /// Symbolic name as it appears in task payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCommand::Ffmpeg => "ffmpeg",
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command name that is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported command: {0:?}")]
pub struct UnsupportedCommand(pub String);

impl FromStr for ToolCommand {
    type Err = UnsupportedCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Exact match only: "FFMPEG" or " ffmpeg" are different tools.
        match s {
            "ffmpeg" => Ok(ToolCommand::Ffmpeg),
            other => Err(UnsupportedCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recognized_command() {
        assert_eq!("ffmpeg".parse::<ToolCommand>(), Ok(ToolCommand::Ffmpeg));
        assert_eq!(ToolCommand::Ffmpeg.to_string(), "ffmpeg");
    }

    #[test]
    fn test_parse_rejects_everything_else() {
        for name in ["", "FFmpeg", "ffmpeg ", "ffprobe", "/usr/bin/ffmpeg", "sh"] {
            let err = name.parse::<ToolCommand>().unwrap_err();
            assert_eq!(err.0, name);
        }
    }
}
