//! Per-job scratch space.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::Result;

/// Scoped scratch directory for one job. Dropped on every exit path, which
/// releases all intermediate files.
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    pub fn create() -> Result<Self> {
        Ok(Self {
            dir: TempDir::with_prefix("syncforge-job-")?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Subdirectory for per-chunk intermediates.
    pub fn chunks_dir(&self) -> Result<PathBuf> {
        let dir = self.dir.path().join("chunks");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// The final stitched artifact.
///
/// Holds the workspace open so the bytes outlive every intermediate file
/// until the caller has uploaded them; dropping this releases the scratch
/// directory.
pub struct FinalArtifact {
    path: PathBuf,
    _workspace: JobWorkspace,
}

impl std::fmt::Debug for FinalArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinalArtifact")
            .field("path", &self.path)
            .finish()
    }
}

impl FinalArtifact {
    pub fn new(path: PathBuf, workspace: JobWorkspace) -> Self {
        Self {
            path,
            _workspace: workspace,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.path).await?)
    }
}
