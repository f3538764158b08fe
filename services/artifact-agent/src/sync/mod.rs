//! Artifact synchronization from the leader into the local cache.

mod error;
mod fetcher;
mod installer;
mod reconciler;
mod watcher;

pub use error::{SyncError, SyncErrorKind};
pub use fetcher::{ArtifactFetcher, FetchError, HttpFetcher, HttpFetcherConfig, LocalFetcher};
pub use installer::{AtomicInstaller, InstallOutcome, StagingDir, STAGING_DIR, STORMDIST_DIR};
pub use reconciler::{PassReport, ReconcilerConfig, ReconciliationLoop, SkipReason};
pub use watcher::AssignmentWatcher;
