//! Reconciliation loop keeping the local artifact cache in sync.
//!
//! Each pass:
//! - Reads the desired job set from the coordination store
//! - Lists installed jobs under `stormdist/`
//! - Installs every missing job (bounded fan-out), each at most once per pass
//!
//! Per-job failures never abort a pass; the next pass simply reselects
//! whatever is still missing.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use nimbus_coordination::ArtifactKind;
use nimbus_id::JobId;
use nimbus_reconcile::{
    plan_sync, ConvergenceStatus, DEFAULT_MAX_CONCURRENT_FETCHES, DEFAULT_RECONCILE_INTERVAL,
};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::fetcher::ArtifactFetcher;
use super::installer::{discard_quietly, AtomicInstaller, InstallOutcome, STORMDIST_DIR};
use super::watcher::AssignmentWatcher;
use super::{SyncError, SyncErrorKind};
use crate::repository::LocalRoot;

/// Reconciliation loop configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Time between passes. The first pass runs one interval after start.
    pub interval: Duration,

    /// Jobs installed concurrently within one pass.
    pub max_concurrent_installs: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONCILE_INTERVAL,
            max_concurrent_installs: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}

/// Why a pass did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The desired set could not be read.
    DesiredUnavailable,
    /// No jobs are assigned.
    NoActiveJobs,
    /// The local install directory could not be listed.
    LocalUnavailable,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default)]
pub struct PassReport {
    /// Set when the pass stopped before planning.
    pub skipped: Option<SkipReason>,

    /// Size of the desired set.
    pub desired: usize,

    /// Jobs found locally at the start of the pass.
    pub local: usize,

    /// Desired jobs that were already installed.
    pub present: usize,

    /// Jobs installed by this pass.
    pub installed: Vec<JobId>,

    /// Jobs another writer installed while this pass was fetching them.
    pub already_installed: Vec<JobId>,

    /// Jobs that failed to install, retried next pass.
    pub failed: Vec<(JobId, SyncError)>,

    /// Installed jobs that are no longer desired. Reported, never removed.
    pub orphaned: Vec<JobId>,
}

impl PassReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }

    /// Convergence status after this pass.
    pub fn status(&self) -> ConvergenceStatus {
        if self.skipped.is_some() {
            ConvergenceStatus::Unknown
        } else if self.failed.is_empty() {
            ConvergenceStatus::Converged
        } else {
            ConvergenceStatus::Converging
        }
    }

    /// Ids that failed in this pass.
    pub fn failed_jobs(&self) -> Vec<&JobId> {
        self.failed.iter().map(|(job, _)| job).collect()
    }
}

/// Shortest period the loop will tick at.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Drives the local cache toward the desired job set.
pub struct ReconciliationLoop {
    local: LocalRoot,
    installer: AtomicInstaller,
    watcher: AssignmentWatcher,
    fetcher: Arc<dyn ArtifactFetcher>,
    config: ReconcilerConfig,
}

impl ReconciliationLoop {
    pub fn new(
        installer: AtomicInstaller,
        watcher: AssignmentWatcher,
        fetcher: Arc<dyn ArtifactFetcher>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            local: LocalRoot::new(installer.root()),
            installer,
            watcher,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run passes until shutdown is signalled or the sender is dropped.
    #[instrument(skip_all, name = "artifact_sync", fields(root = %self.installer.root().display()))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            max_concurrent_installs = self.config.max_concurrent_installs,
            "Starting artifact reconciliation loop"
        );

        // A zero period panics inside tokio.
        let period = self.config.interval.max(MIN_INTERVAL);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reconcile_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Artifact reconciliation loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Perform a single pass.
    pub async fn reconcile_once(&self) -> PassReport {
        let desired = match self.watcher.active_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "Failed to read assignments, skipping pass");
                return PassReport::skipped(SkipReason::DesiredUnavailable);
            }
        };
        if desired.is_empty() {
            debug!("No active jobs");
            return PassReport::skipped(SkipReason::NoActiveJobs);
        }

        let local = match self.local.list(STORMDIST_DIR).await {
            Ok(names) => parse_local(names.unwrap_or_default()),
            Err(e) => {
                warn!(error = %e, "Failed to list installed jobs, skipping pass");
                return PassReport::skipped(SkipReason::LocalUnavailable);
            }
        };

        let mut report = PassReport {
            desired: desired.len(),
            local: local.len(),
            ..Default::default()
        };

        let plan = plan_sync(desired, local);
        report.present = plan.present;
        report.orphaned = plan.orphaned;

        if !plan.missing.is_empty() {
            debug!(missing = plan.missing.len(), "Installing missing jobs");
        }

        let results: Vec<(JobId, Result<InstallOutcome, SyncError>)> =
            stream::iter(plan.missing)
                .map(move |job| async move {
                    let result = self.install(&job).await;
                    (job, result)
                })
                .buffer_unordered(self.config.max_concurrent_installs.max(1))
                .collect()
                .await;

        for (job, result) in results {
            match result {
                Ok(InstallOutcome::Installed) => report.installed.push(job),
                Ok(InstallOutcome::AlreadyInstalled) => report.already_installed.push(job),
                Err(e) => {
                    log_install_failure(&job, &e);
                    report.failed.push((job, e));
                }
            }
        }
        report.installed.sort();
        report.already_installed.sort();
        report.failed.sort_by(|a, b| a.0.cmp(&b.0));

        if !report.orphaned.is_empty() {
            debug!(orphaned = report.orphaned.len(), "Installed jobs without assignment");
        }
        if report.installed.is_empty() && report.failed.is_empty() {
            debug!(desired = report.desired, "Artifact cache up to date");
        } else {
            info!(
                desired = report.desired,
                installed = report.installed.len(),
                failed = report.failed.len(),
                "Reconciliation pass complete"
            );
        }

        report
    }

    /// Fetch one job into a staging directory and publish it.
    async fn install(&self, job: &JobId) -> Result<InstallOutcome, SyncError> {
        let assignment = self.watcher.assignment(job).await?;
        let staging = self.installer.stage().await?;

        for kind in ArtifactKind::ALL {
            let fetched = self
                .fetcher
                .fetch(
                    &assignment.master_code_dir,
                    kind.file_name(),
                    &staging.file_path(kind),
                )
                .await;
            match fetched {
                Ok(bytes) => {
                    debug!(job_id = %job, file = kind.file_name(), bytes, "Fetched artifact")
                }
                Err(source) => {
                    discard_quietly(staging).await;
                    return Err(SyncError::Fetch {
                        file: kind.file_name(),
                        source,
                    });
                }
            }
        }

        Ok(self.installer.commit(staging, job).await?)
    }
}

fn parse_local(names: Vec<String>) -> Vec<JobId> {
    names
        .into_iter()
        .filter_map(|name| match JobId::parse(&name) {
            Ok(job) => Some(job),
            Err(e) => {
                warn!(name = %name, error = %e, "Ignoring unrecognized entry in install directory");
                None
            }
        })
        .collect()
}

fn log_install_failure(job: &JobId, error: &SyncError) {
    match error.kind() {
        SyncErrorKind::NotFound => {
            info!(job_id = %job, error = %error, "Job artifacts not available, will retry")
        }
        kind => warn!(job_id = %job, ?kind, error = %error, "Failed to install job"),
    }
}
