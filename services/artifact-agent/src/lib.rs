//! Nimbus artifact agent library.
//!
//! Every scheduler replica runs an artifact agent so any replica can serve
//! job artifacts after a leader failover. The agent keeps a local cache of
//! each assigned job's artifacts in sync with the coordination store, and
//! buffers per-task context that it periodically writes back.
//!
//! ## Architecture
//!
//! ```text
//! ArtifactRepository
//! ├── SharedRepository     (shared mount, nothing to sync)
//! └── CachedRepository     (local cache)
//!     └── ReconciliationLoop
//!         ├── AssignmentWatcher  (desired jobs from the store)
//!         ├── ArtifactFetcher    (download from the leader)
//!         └── AtomicInstaller    (stage + rename into stormdist/)
//!
//! ContextAggregator
//! └── ContextFlusher       (periodic write to customercontext/)
//! ```
//!
//! ## Modules
//!
//! - `repository`: storage interface and its two variants
//! - `sync`: reconciliation of the local cache
//! - `context`: per-task context map and flush loop
//! - `config`: environment configuration for the binary

pub mod background;
pub mod config;
pub mod context;
pub mod repository;
pub mod sync;

pub use background::BackgroundTask;
pub use context::{ContextAggregator, ContextFlusher, FlushConfig, FlushReport};
pub use repository::{
    ArtifactRepository, CachedRepository, CachedRepositoryConfig, SharedRepository, StorageError,
};
pub use sync::{PassReport, ReconcilerConfig, ReconciliationLoop, SyncError, SyncErrorKind};
