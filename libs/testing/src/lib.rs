//! Test fixtures shared across the workspace.
//!
//! - Leader artifact trees on disk
//! - Assignment seeding in a coordination store
//! - A coordination store wrapper that injects failures by path

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use nimbus_coordination::{ArtifactKind, Assignment, CoordinationStore, StoreError, StoreLayout};
use nimbus_id::JobId;

/// Install a compact tracing subscriber for test output. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Parse a job ID, panicking on invalid input.
pub fn job(id: &str) -> JobId {
    JobId::parse(id).unwrap_or_else(|e| panic!("invalid test job id {id:?}: {e}"))
}

/// Contents written for an artifact by [`write_leader_artifacts`].
pub fn artifact_contents(job: &JobId, kind: ArtifactKind) -> Vec<u8> {
    format!("{job}:{}", kind.file_name()).into_bytes()
}

/// Write the three artifact files for `job` under `leader_root/<job>`.
///
/// Returns the job's artifact directory, suitable as `master_code_dir`.
pub fn write_leader_artifacts(leader_root: &Path, job: &JobId) -> io::Result<PathBuf> {
    let dir = leader_root.join(job.as_str());
    std::fs::create_dir_all(&dir)?;
    for kind in ArtifactKind::ALL {
        std::fs::write(dir.join(kind.file_name()), artifact_contents(job, kind))?;
    }
    Ok(dir)
}

/// Publish an assignment for `job` the way the leader does.
pub async fn publish_assignment(
    store: &dyn CoordinationStore,
    layout: &StoreLayout,
    job: &JobId,
    master_code_dir: &str,
) -> Result<(), StoreError> {
    let path = layout.assignment(job);
    let data = Assignment::new(master_code_dir)
        .to_vec()
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    store.mkdirs(&path).await?;
    store.set(&path, &data).await
}

/// Remove the assignment for `job`, as decommissioning does.
pub async fn retract_assignment(
    store: &dyn CoordinationStore,
    layout: &StoreLayout,
    job: &JobId,
) -> Result<(), StoreError> {
    store.delete(&layout.assignment(job)).await
}

/// Coordination store that fails any operation whose path contains a
/// configured fragment. Everything else is forwarded.
pub struct FlakyStore {
    inner: Arc<dyn CoordinationStore>,
    failing: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn CoordinationStore>) -> Self {
        Self {
            inner,
            failing: Mutex::new(Vec::new()),
        }
    }

    /// Fail every operation on paths containing `fragment`.
    pub fn fail_paths_containing(&self, fragment: impl Into<String>) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fragment.into());
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn check(&self, path: &str) -> Result<(), StoreError> {
        let failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing.iter().any(|fragment| path.contains(fragment.as_str())) {
            Err(StoreError::Unavailable(format!("injected failure for {path}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CoordinationStore for FlakyStore {
    async fn children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        self.check(path)?;
        self.inner.children(path).await
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.check(path)?;
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        self.check(path)?;
        self.inner.set(path, data).await
    }

    async fn mkdirs(&self, path: &str) -> Result<(), StoreError> {
        self.check(path)?;
        self.inner.mkdirs(path).await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.check(path)?;
        self.inner.delete(path).await
    }
}
