//! Error types for coordination store operations.

use thiserror::Error;

/// Errors from coordination store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The node does not exist.
    #[error("node not found: {0}")]
    NotFound(String),

    /// The path cannot be represented in the store.
    #[error("invalid store path: {0}")]
    InvalidPath(String),

    /// The store could not be reached or refused the request.
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns true if the requested node does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
