//! Directories that hold snapshot files

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::errors::FleetError;
use crate::filesys::file::File;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory and any missing parents. Existing is fine.
    pub async fn create(&self) -> Result<(), FleetError> {
        fs::create_dir_all(&self.path).await.map_err(|e| {
            FleetError::StorageError(format!(
                "failed to create directory {}: {}",
                self.path.display(),
                e
            ))
        })?;
        debug!(path = %self.path.display(), "Directory ready");
        Ok(())
    }

    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }
}
