//! In-memory per-task context shared by components on this node.
//!
//! Writes are frequent and land in memory; the flush loop periodically
//! persists every task bucket to the coordination store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use nimbus_coordination::{CoordinationStore, StoreLayout};
use nimbus_id::{JobId, TaskId};
use serde_json::Value;
use tracing::debug;

use super::flush::{ContextError, ContextFlusher, FlushConfig};
use crate::background::BackgroundTask;

/// Key/value entries for one (job, task) pair.
pub(crate) type Bucket = Mutex<BTreeMap<String, Value>>;

type TaskBuckets = RwLock<HashMap<TaskId, Arc<Bucket>>>;

/// Concurrent map of job → task → key → value.
///
/// Outer maps are only write-locked to insert a new job or task, so writers
/// contend only when they target the same task bucket.
pub struct ContextAggregator {
    jobs: RwLock<HashMap<JobId, Arc<TaskBuckets>>>,
    flush: BackgroundTask,
}

impl Default for ContextAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextAggregator {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            flush: BackgroundTask::new("context-flush"),
        }
    }

    /// Insert or overwrite a value.
    pub fn put(&self, job: &JobId, task: TaskId, key: impl Into<String>, value: Value) {
        let bucket = self.bucket(job, task);
        bucket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    /// Look up a value. Unknown job, task or key yields `None`.
    pub fn get(&self, job: &JobId, task: TaskId, key: &str) -> Option<Value> {
        let bucket = self.existing_bucket(job, task)?;
        let entries = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    /// Snapshot of one task's entries.
    pub fn task_entries(&self, job: &JobId, task: TaskId) -> Option<BTreeMap<String, Value>> {
        let bucket = self.existing_bucket(job, task)?;
        let entries = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        Some(entries.clone())
    }

    /// Drop all context for a job. Returns true if the job had any.
    ///
    /// Entries already persisted to the store are not removed.
    pub fn remove_job(&self, job: &JobId) -> bool {
        let removed = self
            .jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job)
            .is_some();
        if removed {
            debug!(job_id = %job, "Evicted job context");
        }
        removed
    }

    /// Jobs that currently hold context.
    pub fn jobs(&self) -> Vec<JobId> {
        let mut jobs: Vec<JobId> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        jobs.sort();
        jobs
    }

    /// Start the periodic flush to `store`. Only the first call starts a loop;
    /// later calls return `Ok(false)`. Must be called within a Tokio runtime.
    ///
    /// The loop exits once the last handle to the aggregator is dropped.
    pub fn start_flush(
        self: &Arc<Self>,
        store: Arc<dyn CoordinationStore>,
        layout: StoreLayout,
        config: FlushConfig,
    ) -> Result<bool, ContextError> {
        if config.interval.is_zero() {
            return Err(ContextError::InvalidConfig(
                "flush interval must be greater than zero".to_string(),
            ));
        }

        let flusher = ContextFlusher::new(self, store, layout, config);
        Ok(self
            .flush
            .ensure_started(move |shutdown| async move { flusher.run(shutdown).await }))
    }

    /// Stop the flush loop and wait for it to exit.
    pub async fn stop_flush(&self) {
        self.flush.shutdown().await;
    }

    /// True while the flush loop is running.
    pub fn is_flushing(&self) -> bool {
        self.flush.is_running()
    }

    /// Every bucket currently in the map, without holding any lock afterwards.
    pub(crate) fn buckets(&self) -> Vec<(JobId, TaskId, Arc<Bucket>)> {
        let jobs: Vec<(JobId, Arc<TaskBuckets>)> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(job, tasks)| (job.clone(), Arc::clone(tasks)))
            .collect();

        let mut buckets = Vec::new();
        for (job, tasks) in jobs {
            let tasks = tasks.read().unwrap_or_else(PoisonError::into_inner);
            for (task, bucket) in tasks.iter() {
                buckets.push((job.clone(), *task, Arc::clone(bucket)));
            }
        }
        buckets
    }

    fn existing_bucket(&self, job: &JobId, task: TaskId) -> Option<Arc<Bucket>> {
        let tasks = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job)
            .cloned()?;
        let bucket = tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task)
            .cloned();
        bucket
    }

    fn bucket(&self, job: &JobId, task: TaskId) -> Arc<Bucket> {
        let existing = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job)
            .cloned();
        let tasks = match existing {
            Some(tasks) => tasks,
            None => Arc::clone(
                self.jobs
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(job.clone())
                    .or_default(),
            ),
        };

        let existing = tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task)
            .cloned();
        let bucket = match existing {
            Some(bucket) => bucket,
            None => Arc::clone(
                tasks
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(task)
                    .or_default(),
            ),
        };
        bucket
    }
}
