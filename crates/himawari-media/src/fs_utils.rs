//! Filesystem helpers for the working directory and output artifacts.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Create the working directory if needed and check it is a directory.
pub async fn ensure_work_dir(path: impl AsRef<Path>) -> MediaResult<()> {
    let path = path.as_ref();
    let work_dir_error = |source| MediaError::WorkDir {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(path).await.map_err(work_dir_error)?;

    let metadata = fs::metadata(path).await.map_err(work_dir_error)?;
    if !metadata.is_dir() {
        return Err(work_dir_error(std::io::Error::other("not a directory")));
    }
    Ok(())
}

/// Owns an output artifact path and removes the file when dropped.
///
/// The file may or may not exist: the tool creates it, and a failed or
/// cancelled run can leave a partial file behind. Either way it is gone
/// once the guard is dropped.
#[derive(Debug)]
pub struct ArtifactGuard {
    path: PathBuf,
}

impl ArtifactGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        // Drop cannot await; a single unlink is cheap enough to do inline.
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed output artifact");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove output artifact"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_guard_removes_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc.mp4");
        fs::write(&path, b"video").await.unwrap();

        drop(ArtifactGuard::new(&path));

        assert!(!path.exists(), "Artifact should be removed");
    }

    #[tokio::test]
    async fn test_guard_tolerates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("never-written.mp4");

        let guard = ArtifactGuard::new(&path);
        assert_eq!(guard.path(), path);
        drop(guard);

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_ensure_work_dir_creates_nested() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");

        ensure_work_dir(&nested).await.unwrap();
        assert!(nested.is_dir());

        // Idempotent
        ensure_work_dir(&nested).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_work_dir_rejects_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, b"x").await.unwrap();

        let err = ensure_work_dir(&file).await.unwrap_err();
        assert!(matches!(err, MediaError::WorkDir { .. }));
    }
}
