//! Coordination store backed by a directory tree.
//!
//! Each node is a directory; its data lives in a `.node-data` file inside it.
//! Pointing every replica at the same shared mount gives them one namespace.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::store::{normalize_path, CoordinationStore};
use crate::StoreError;

/// File holding a node's data. Never reported as a child.
const DATA_FILE: &str = ".node-data";

/// Marks in-flight writes of `DATA_FILE`.
const TEMP_SUFFIX: &str = ".tmp-";

/// True for the store's own bookkeeping files inside a node directory.
fn is_reserved(name: &str) -> bool {
    name.strip_prefix(DATA_FILE)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(TEMP_SUFFIX))
}

/// Directory-tree coordination store.
#[derive(Debug, Clone)]
pub struct FsStore {
    base: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `base`. The directory is created lazily.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Base directory of the store.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn node_dir(&self, path: &str) -> Result<PathBuf, StoreError> {
        let mut dir = self.base.clone();
        for segment in normalize_path(path)? {
            dir.push(segment);
        }
        Ok(dir)
    }
}

fn not_found(path: &str, err: io::Error) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(path.to_string())
    } else {
        StoreError::Io(err)
    }
}

async fn require_dir(dir: &Path, path: &str) -> Result<(), StoreError> {
    let metadata = fs::metadata(dir).await.map_err(|e| not_found(path, e))?;
    if metadata.is_dir() {
        Ok(())
    } else {
        Err(StoreError::NotFound(path.to_string()))
    }
}

#[async_trait]
impl CoordinationStore for FsStore {
    async fn children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.node_dir(path)?;
        require_dir(&dir, path).await?;

        let mut entries = fs::read_dir(&dir).await.map_err(|e| not_found(path, e))?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_reserved(&name) {
                continue;
            }
            if entry.file_type().await?.is_dir() {
                children.push(name);
            }
        }

        Ok(children)
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let dir = self.node_dir(path)?;
        require_dir(&dir, path).await?;

        match fs::read(dir.join(DATA_FILE)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn set(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let dir = self.node_dir(path)?;
        require_dir(&dir, path).await?;

        // Readers on other replicas must never see a torn write.
        let temp = dir.join(format!("{DATA_FILE}{TEMP_SUFFIX}{}", uuid::Uuid::new_v4()));
        fs::write(&temp, data).await?;
        if let Err(e) = fs::rename(&temp, dir.join(DATA_FILE)).await {
            fs::remove_file(&temp).await.ok();
            return Err(StoreError::Io(e));
        }

        Ok(())
    }

    async fn mkdirs(&self, path: &str) -> Result<(), StoreError> {
        let dir = self.node_dir(path)?;
        debug!(path = %path, dir = %dir.display(), "Creating store node");
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let dir = self.node_dir(path)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
