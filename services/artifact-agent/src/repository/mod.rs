//! Pluggable artifact storage.
//!
//! Scheduler components read and write job artifacts only through
//! [`ArtifactRepository`]. Two variants exist:
//!
//! - [`SharedRepository`]: a natively shared filesystem mount. Every replica
//!   already sees every write, so there is nothing to synchronize.
//! - [`CachedRepository`]: a per-node cache kept eventually consistent with
//!   the coordination store by the reconciliation loop.
//!
//! All paths are relative to the backend root. A leading `/` is still
//! resolved under the root and `..` components are rejected.

mod cached;
mod local;
mod shared;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

pub use cached::{CachedRepository, CachedRepositoryConfig};
pub use local::LocalRoot;
pub use shared::SharedRepository;

/// Readable artifact stream.
pub type ArtifactReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable artifact stream. Callers must `shutdown()` it to flush.
pub type ArtifactWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("invalid artifact path: {0}")]
    InvalidPath(String),

    #[error("path is a directory: {0}")]
    IsDirectory(String),

    #[error("invalid repository configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true if the path does not resolve to an existing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Contract every artifact storage backend implements identically.
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// One-time setup. Safe to call repeatedly and concurrently; background
    /// loops are started at most once. Setup failures are returned.
    async fn init(&self) -> Result<(), StorageError>;

    /// Open an artifact for reading.
    async fn open(&self, path: &str) -> Result<ArtifactReader, StorageError>;

    /// Create or truncate an artifact. Missing parent directories are created.
    async fn create(&self, path: &str) -> Result<ArtifactWriter, StorageError>;

    /// List entry names under a directory.
    ///
    /// `None` means the directory does not exist; `Some(vec![])` means it is empty.
    async fn list(&self, path: &str) -> Result<Option<Vec<String>>, StorageError>;

    /// Recursively delete a path. No-op if it does not exist.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Create a directory and its parents. No-op if it exists.
    async fn mkdirs(&self, path: &str) -> Result<(), StorageError>;

    /// Whether writes are visible cluster-wide without extra coordination
    /// from the caller.
    fn is_support_distributed(&self) -> bool;
}
