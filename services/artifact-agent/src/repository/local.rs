//! Root-scoped local filesystem operations shared by both repository variants.

use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::fs;

use super::{ArtifactReader, ArtifactWriter, StorageError};

/// A directory that all repository paths resolve under.
#[derive(Debug, Clone)]
pub struct LocalRoot {
    root: PathBuf,
}

impl LocalRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a repository path to a location under the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(segment) => resolved.push(segment),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(StorageError::InvalidPath(path.to_string()));
                }
            }
        }
        Ok(resolved)
    }

    pub async fn open(&self, path: &str) -> Result<ArtifactReader, StorageError> {
        let resolved = self.resolve(path)?;
        let metadata = fs::metadata(&resolved)
            .await
            .map_err(|e| not_found(path, e))?;
        if metadata.is_dir() {
            return Err(StorageError::IsDirectory(path.to_string()));
        }

        let file = fs::File::open(&resolved)
            .await
            .map_err(|e| not_found(path, e))?;
        Ok(Box::new(file))
    }

    pub async fn create(&self, path: &str) -> Result<ArtifactWriter, StorageError> {
        let resolved = self.resolve(path)?;
        if resolved == self.root {
            return Err(StorageError::IsDirectory(path.to_string()));
        }
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = fs::File::create(&resolved).await?;
        Ok(Box::new(file))
    }

    /// Sorted entry names, or `None` if `path` is not an existing directory.
    pub async fn list(&self, path: &str) -> Result<Option<Vec<String>>, StorageError> {
        let resolved = self.resolve(path)?;
        match fs::metadata(&resolved).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        }

        let mut entries = match fs::read_dir(&resolved).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        Ok(Some(names))
    }

    pub async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let resolved = self.resolve(path)?;
        let metadata = match fs::symlink_metadata(&resolved).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let result = if metadata.is_dir() {
            fs::remove_dir_all(&resolved).await
        } else {
            fs::remove_file(&resolved).await
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    pub async fn mkdirs(&self, path: &str) -> Result<(), StorageError> {
        let resolved = self.resolve(path)?;
        fs::create_dir_all(&resolved).await?;
        Ok(())
    }
}

fn not_found(path: &str, err: io::Error) -> StorageError {
    if err.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        StorageError::Io(err)
    }
}
