use std::sync::Arc;

use nimbus_coordination::{Assignment, CoordinationStore, StoreLayout};
use nimbus_id::JobId;
use tracing::warn;

use super::SyncError;

/// Reads the desired job set and per-job assignments from the coordination store.
#[derive(Clone)]
pub struct AssignmentWatcher {
    store: Arc<dyn CoordinationStore>,
    layout: StoreLayout,
}

impl AssignmentWatcher {
    pub fn new(store: Arc<dyn CoordinationStore>, layout: StoreLayout) -> Self {
        Self { store, layout }
    }

    /// Jobs that currently have an assignment. An absent assignments node
    /// means no active jobs. Names that are not valid job ids are skipped.
    pub async fn active_jobs(&self) -> Result<Vec<JobId>, SyncError> {
        let children = match self.store.children(&self.layout.assignments()).await {
            Ok(children) => children,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut jobs = Vec::with_capacity(children.len());
        for name in children {
            match JobId::parse(name.as_str()) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(name = %name, error = %e, "Skipping invalid assignment name"),
            }
        }
        Ok(jobs)
    }

    /// Typed assignment for one job.
    pub async fn assignment(&self, job: &JobId) -> Result<Assignment, SyncError> {
        let data = match self.store.get(&self.layout.assignment(job)).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return Err(SyncError::AssignmentMissing(job.clone())),
            Err(e) => return Err(e.into()),
        };

        Assignment::from_slice(&data).map_err(|source| SyncError::Decode {
            job: job.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_coordination::MemoryStore;

    fn job(id: &str) -> JobId {
        JobId::parse(id).unwrap()
    }

    fn watcher() -> (Arc<MemoryStore>, AssignmentWatcher) {
        let store = Arc::new(MemoryStore::new());
        let watcher = AssignmentWatcher::new(store.clone(), StoreLayout::default());
        (store, watcher)
    }

    #[tokio::test]
    async fn test_active_jobs_absent_node_is_empty() {
        let (_store, watcher) = watcher();
        assert!(watcher.active_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_jobs_lists_children() {
        let (store, watcher) = watcher();
        let layout = StoreLayout::default();
        store.mkdirs(&layout.assignment(&job("a-1"))).await.unwrap();
        store.mkdirs(&layout.assignment(&job("b-2"))).await.unwrap();

        let mut jobs = watcher.active_jobs().await.unwrap();
        jobs.sort();
        assert_eq!(jobs, vec![job("a-1"), job("b-2")]);
    }

    #[tokio::test]
    async fn test_assignment_decodes() {
        let (store, watcher) = watcher();
        let layout = StoreLayout::default();
        let path = layout.assignment(&job("wc-1"));
        store.mkdirs(&path).await.unwrap();
        store
            .set(&path, br#"{"master_code_dir":"/leader/stormdist/wc-1","extra":1}"#)
            .await
            .unwrap();

        let assignment = watcher.assignment(&job("wc-1")).await.unwrap();
        assert_eq!(assignment.master_code_dir, "/leader/stormdist/wc-1");
    }

    #[tokio::test]
    async fn test_assignment_missing_and_undecodable() {
        let (store, watcher) = watcher();
        let err = watcher.assignment(&job("gone")).await.unwrap_err();
        assert!(matches!(err, SyncError::AssignmentMissing(_)));
        assert!(err.is_not_found());

        let layout = StoreLayout::default();
        let path = layout.assignment(&job("bad"));
        store.mkdirs(&path).await.unwrap();
        store.set(&path, b"not json").await.unwrap();
        assert!(matches!(
            watcher.assignment(&job("bad")).await.unwrap_err(),
            SyncError::Decode { .. }
        ));
    }
}
