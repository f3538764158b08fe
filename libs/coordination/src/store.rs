//! The coordination store contract.

use async_trait::async_trait;

use crate::StoreError;

/// Hierarchical key/value store with directory-like listing.
///
/// Paths are `/`-separated and absolute. Implementations must be safe to share
/// between the reconciliation loop, the flush loop, and callers.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// List the names of a node's direct children.
    ///
    /// Fails with `NotFound` if the node does not exist.
    async fn children(&self, path: &str) -> Result<Vec<String>, StoreError>;

    /// Read a node's data.
    ///
    /// Fails with `NotFound` if the node does not exist.
    async fn get(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Overwrite a node's data. The node must already exist.
    async fn set(&self, path: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Create a node and any missing ancestors. No-op if it exists.
    async fn mkdirs(&self, path: &str) -> Result<(), StoreError>;

    /// Delete a node and all of its descendants. No-op if it does not exist.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}

/// Split a store path into validated segments.
///
/// Empty and `.` segments are dropped; `..` is rejected.
pub fn normalize_path(path: &str) -> Result<Vec<&str>, StoreError> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(StoreError::InvalidPath(path.to_string())),
            s => segments.push(s),
        }
    }
    Ok(segments)
}

/// Join segments into a canonical absolute path (`/` for the root).
pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        out.push_str(segment.as_ref());
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}
