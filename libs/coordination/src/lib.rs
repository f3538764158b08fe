//! # nimbus-coordination
//!
//! The coordination store is the single source of truth for desired cluster
//! state. It is a hierarchical key/value namespace with directory-like
//! listing: every node may hold data and may have children.
//!
//! ## Layout
//!
//! ```text
//! <root>/assignments/<job-id>                  Assignment record (JSON)
//! <root>/customercontext/<job-id>/<task-id>    task context map (JSON)
//! ```
//!
//! ## Modules
//!
//! - `store`: the `CoordinationStore` contract
//! - `memory`: in-process store for tests and single-process deployments
//! - `fs`: store backed by a directory tree on a shared mount
//! - `layout`: path construction for the layout above
//! - `assignment`: the typed assignment record and artifact file names

mod assignment;
mod error;
mod fs;
mod layout;
mod memory;
mod store;

pub use assignment::{ArtifactKind, Assignment};
pub use error::StoreError;
pub use fs::FsStore;
pub use layout::StoreLayout;
pub use memory::MemoryStore;
pub use store::{join_path, normalize_path, CoordinationStore};
