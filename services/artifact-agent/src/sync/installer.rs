//! Atomic installation of job artifacts into the local cache.
//!
//! Artifacts are downloaded into `<root>/tmp/<uuid>` and published with a
//! single directory rename into `<root>/stormdist/<job>`. Readers therefore
//! see either a fully populated job directory or none at all.

use std::io;
use std::path::{Path, PathBuf};

use nimbus_coordination::ArtifactKind;
use nimbus_id::JobId;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Installed jobs live under this directory of the cache root.
pub const STORMDIST_DIR: &str = "stormdist";

/// Staging directories live under this directory of the cache root.
pub const STAGING_DIR: &str = "tmp";

/// Result of publishing a staged job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The staged directory became the job directory.
    Installed,
    /// The job directory already existed and was left untouched.
    AlreadyInstalled,
}

/// A staging directory that is removed on drop unless committed.
///
/// Prefer [`discard`](Self::discard) on async paths; the drop cleanup blocks
/// the calling thread and is left for cancelled installs.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    armed: bool,
}

impl StagingDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Destination for one artifact file inside the staging directory.
    pub fn file_path(&self, kind: ArtifactKind) -> PathBuf {
        self.path.join(kind.file_name())
    }

    /// Remove the directory without blocking the runtime.
    pub async fn discard(mut self) -> io::Result<()> {
        self.disarm();
        match fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Removed staging directory");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed staging directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove staging directory")
            }
        }
    }
}

/// Stages and publishes job directories under a cache root.
#[derive(Debug, Clone)]
pub struct AtomicInstaller {
    root: PathBuf,
}

impl AtomicInstaller {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of a job's artifacts.
    pub fn job_dir(&self, job: &JobId) -> PathBuf {
        self.root.join(STORMDIST_DIR).join(job.as_str())
    }

    fn staging_root(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Create the root, install and staging directories.
    pub async fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(self.root.join(STORMDIST_DIR)).await?;
        fs::create_dir_all(self.staging_root()).await?;
        Ok(())
    }

    /// Create a fresh, uniquely named staging directory.
    pub async fn stage(&self) -> io::Result<StagingDir> {
        let staging_root = self.staging_root();
        fs::create_dir_all(&staging_root).await?;

        let path = staging_root.join(Uuid::new_v4().to_string());
        fs::create_dir(&path).await?;

        Ok(StagingDir { path, armed: true })
    }

    /// Publish a staged directory as the job directory.
    ///
    /// If the job directory exists, or another writer publishes it first, the
    /// existing directory wins and the staged copy is discarded.
    pub async fn commit(&self, mut staging: StagingDir, job: &JobId) -> io::Result<InstallOutcome> {
        let target = self.job_dir(job);
        if fs::try_exists(&target).await? {
            debug!(job_id = %job, "Job already installed, discarding staged copy");
            discard_quietly(staging).await;
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        fs::create_dir_all(self.root.join(STORMDIST_DIR)).await?;

        if let Err(e) = fs::rename(staging.path(), &target).await {
            if fs::try_exists(&target).await.unwrap_or(false) {
                debug!(job_id = %job, error = %e, "Lost install race, keeping existing directory");
                discard_quietly(staging).await;
                return Ok(InstallOutcome::AlreadyInstalled);
            }
            discard_quietly(staging).await;
            return Err(e);
        }

        staging.disarm();
        info!(job_id = %job, path = %target.display(), "Job artifacts installed");
        Ok(InstallOutcome::Installed)
    }

    /// True when all three artifact files are present for `job`.
    pub async fn is_installed(&self, job: &JobId) -> io::Result<bool> {
        let dir = self.job_dir(job);
        for kind in ArtifactKind::ALL {
            if !fs::try_exists(dir.join(kind.file_name())).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Remove every leftover staging directory. Returns how many were removed.
    pub async fn sweep_staging(&self) -> io::Result<usize> {
        let mut entries = match fs::read_dir(self.staging_root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        if removed > 0 {
            info!(removed, "Swept stale staging directories");
        }
        Ok(removed)
    }
}

/// Discard a staging directory, logging instead of failing. Leftovers are
/// swept on the next start.
pub(crate) async fn discard_quietly(staging: StagingDir) {
    let path = staging.path().to_path_buf();
    if let Err(e) = staging.discard().await {
        warn!(path = %path.display(), error = %e, "Failed to remove staging directory");
    }
}
