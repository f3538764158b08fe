//! # nimbus-id
//!
//! Identifier types shared by the scheduler replicas.
//!
//! ## Design Principles
//!
//! - Job IDs are opaque and assigned by the leader at submission time
//! - A job ID is always a single, safe path segment, because it names both a
//!   directory in the local artifact cache and a node in the coordination store
//! - Task IDs are small integers, unique within their job
//!
//! ## Examples
//!
//! - `wordcount-1-1700000000`
//! - `fraud-detector-12-1712345678`

mod error;
mod types;

pub use error::IdError;
pub use types::*;
