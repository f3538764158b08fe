use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use super::{ArtifactReader, ArtifactRepository, ArtifactWriter, LocalRoot, StorageError};

/// Repository backed by a filesystem mounted identically on every replica.
#[derive(Debug, Clone)]
pub struct SharedRepository {
    root: LocalRoot,
}

impl SharedRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: LocalRoot::new(root),
        }
    }
}

#[async_trait]
impl ArtifactRepository for SharedRepository {
    async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(self.root.path()).await?;
        info!(root = %self.root.path().display(), "Shared artifact repository ready");
        Ok(())
    }

    async fn open(&self, path: &str) -> Result<ArtifactReader, StorageError> {
        self.root.open(path).await
    }

    async fn create(&self, path: &str) -> Result<ArtifactWriter, StorageError> {
        self.root.create(path).await
    }

    async fn list(&self, path: &str) -> Result<Option<Vec<String>>, StorageError> {
        self.root.list(path).await
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.root.delete(path).await
    }

    async fn mkdirs(&self, path: &str) -> Result<(), StorageError> {
        self.root.mkdirs(path).await
    }

    fn is_support_distributed(&self) -> bool {
        true
    }
}
