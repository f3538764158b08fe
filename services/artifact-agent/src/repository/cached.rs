use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use nimbus_coordination::{CoordinationStore, StoreLayout};
use tracing::info;

use super::{ArtifactReader, ArtifactRepository, ArtifactWriter, LocalRoot, StorageError};
use crate::background::BackgroundTask;
use crate::sync::{
    ArtifactFetcher, AssignmentWatcher, AtomicInstaller, PassReport, ReconcilerConfig,
    ReconciliationLoop,
};

/// Configuration for [`CachedRepository`].
#[derive(Debug, Clone)]
pub struct CachedRepositoryConfig {
    /// Cache root, normally `<local-dir>/nimbus`.
    pub root: PathBuf,

    /// Coordination store layout to read assignments from.
    pub layout: StoreLayout,

    /// Reconciliation loop settings.
    pub reconciler: ReconcilerConfig,
}

/// Repository backed by a per-node cache that a background loop keeps in
/// sync with the assignments in the coordination store.
pub struct CachedRepository {
    local: LocalRoot,
    installer: AtomicInstaller,
    sync: Arc<ReconciliationLoop>,
    task: BackgroundTask,
}

impl CachedRepository {
    pub fn new(
        config: CachedRepositoryConfig,
        store: Arc<dyn CoordinationStore>,
        fetcher: Arc<dyn ArtifactFetcher>,
    ) -> Self {
        let installer = AtomicInstaller::new(&config.root);
        let watcher = AssignmentWatcher::new(store, config.layout);
        let sync = ReconciliationLoop::new(installer.clone(), watcher, fetcher, config.reconciler);

        Self {
            local: LocalRoot::new(&config.root),
            installer,
            sync: Arc::new(sync),
            task: BackgroundTask::new("artifact-sync"),
        }
    }

    pub fn root(&self) -> &Path {
        self.local.path()
    }

    /// Run one reconciliation pass immediately, outside the loop schedule.
    pub async fn reconcile_now(&self) -> PassReport {
        self.sync.reconcile_once().await
    }

    /// Stop the reconciliation loop and wait for it to exit.
    pub async fn shutdown(&self) {
        self.task.shutdown().await;
    }
}

#[async_trait]
impl ArtifactRepository for CachedRepository {
    async fn init(&self) -> Result<(), StorageError> {
        if self.sync.config().interval.is_zero() {
            return Err(StorageError::InvalidConfig(
                "reconcile interval must be greater than zero".to_string(),
            ));
        }

        self.installer.prepare().await?;

        // Only safe before the loop exists; afterwards tmp/ may hold live downloads.
        if !self.task.is_started() {
            self.installer.sweep_staging().await?;
        }

        let sync = Arc::clone(&self.sync);
        if self
            .task
            .ensure_started(move |shutdown| async move { sync.run(shutdown).await })
        {
            info!(root = %self.local.path().display(), "Cached artifact repository ready");
        }
        Ok(())
    }

    async fn open(&self, path: &str) -> Result<ArtifactReader, StorageError> {
        self.local.open(path).await
    }

    async fn create(&self, path: &str) -> Result<ArtifactWriter, StorageError> {
        self.local.create(path).await
    }

    async fn list(&self, path: &str) -> Result<Option<Vec<String>>, StorageError> {
        self.local.list(path).await
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.local.delete(path).await
    }

    async fn mkdirs(&self, path: &str) -> Result<(), StorageError> {
        self.local.mkdirs(path).await
    }

    fn is_support_distributed(&self) -> bool {
        self.task.is_running()
    }
}
