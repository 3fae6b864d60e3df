use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use super::paths::{PathError, workspace_path_for};

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("invalid blob key: {0}")]
    InvalidKey(#[from] PathError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Vec<u8>, BlobError>;

    /// Replaces the whole blob.
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError>;

    async fn delete(&self, key: &str) -> Result<(), BlobError>;
}

/// Blob store backed by a workspace directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn prune_empty_dirs(&self, start: Option<&Path>) {
        let mut current = start.map(Path::to_path_buf);
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            // remove_dir refuses non-empty directories.
            if tokio::fs::remove_dir(&dir).await.is_err() {
                break;
            }
            current = dir.parent().map(Path::to_path_buf);
        }
    }
}

fn not_found_as(key: &str, err: io::Error) -> BlobError {
    if err.kind() == io::ErrorKind::NotFound {
        BlobError::NotFound(key.to_string())
    } else {
        BlobError::Io(err)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn read(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = workspace_path_for(&self.root, key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|err| not_found_as(key, err))
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let target = workspace_path_for(&self.root, key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp_name = target
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".partial");
        let tmp = target.with_file_name(tmp_name);

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        if let Err(err) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = workspace_path_for(&self.root, key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|err| not_found_as(key, err))?;
        self.prune_empty_dirs(path.parent()).await;
        Ok(())
    }
}
