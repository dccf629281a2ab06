//! Preset side-input file for the external tool.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Prefix of every preset file, so strays are recognizable after a crash.
pub const PRESET_FILE_PREFIX: &str = "ffmpeg-preset-";

/// A preset payload written to a uniquely named temporary file.
///
/// The file lives exactly as long as this handle. Dropping it deletes the
/// file; [`PresetFile::release`] does the same but reports failures.
#[derive(Debug)]
pub struct PresetFile {
    path: TempPath,
}

impl PresetFile {
    /// Write `payload` to a fresh temp file in `dir` (or the system temp
    /// directory when `None`).
    ///
    /// A failed write removes the half-written file before returning.
    pub fn create(payload: &str, dir: Option<&Path>) -> MediaResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PRESET_FILE_PREFIX);

        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(MediaError::PresetWrite)?;

        file.write_all(payload.as_bytes())
            .and_then(|_| file.flush())
            .map_err(MediaError::PresetWrite)?;

        let path = file.into_temp_path();
        debug!(path = %path.display(), bytes = payload.len(), "Preset file written");

        Ok(Self { path })
    }

    /// Async wrapper around [`PresetFile::create`] that keeps the blocking
    /// write off the runtime threads.
    pub async fn write(payload: String, dir: Option<PathBuf>) -> MediaResult<Self> {
        tokio::task::spawn_blocking(move || Self::create(&payload, dir.as_deref()))
            .await
            .map_err(|e| MediaError::PresetWrite(std::io::Error::other(e)))?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now, surfacing any removal error.
    pub fn release(self) -> MediaResult<()> {
        let shown = self.path.display().to_string();
        self.path.close().map_err(|e| {
            warn!(path = %shown, error = %e, "Failed to remove preset file");
            MediaError::Io(e)
        })
    }
}
