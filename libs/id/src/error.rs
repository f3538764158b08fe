//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID is a relative path component (`.` or `..`).
    #[error("ID cannot be a relative path component: '{0}'")]
    Relative(String),

    /// The ID contains a character that is not allowed in a path segment.
    #[error("ID contains forbidden character {character:?}: '{id}'")]
    ForbiddenChar { id: String, character: char },

    /// The task ID is not a non-negative integer.
    #[error("invalid task ID: '{0}'")]
    InvalidTaskId(String),
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    /// Returns true if the input would have escaped its parent path.
    pub fn is_path_escape(&self) -> bool {
        matches!(self, IdError::Relative(_))
            || matches!(self, IdError::ForbiddenChar { character, .. } if *character == '/' || *character == '\\')
    }
}
