//! Single files: JSON snapshots and settings

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::FleetError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True for regular files only
    pub async fn exists(&self) -> bool {
        matches!(fs::metadata(&self.path).await, Ok(meta) if meta.is_file())
    }

    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, FleetError> {
        let bytes = fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Serialize `value` as pretty JSON and replace the file atomically
    pub async fn write_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), FleetError> {
        let contents = serde_json::to_vec_pretty(value)?;
        self.write_atomic(&contents).await
    }

    /// Write to a sibling temp file, fsync, then rename over the target.
    /// Readers see either the old or the new contents, never a partial write.
    pub async fn write_atomic(&self, contents: &[u8]) -> Result<(), FleetError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.temp_path();
        let mut temp = fs::File::create(&temp_path).await?;
        temp.write_all(contents).await?;
        temp.sync_all().await?;
        drop(temp);

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }
}
