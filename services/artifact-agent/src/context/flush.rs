//! Periodic persistence of task context to the coordination store.

use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;

use nimbus_coordination::{CoordinationStore, StoreError, StoreLayout};
use nimbus_id::{JobId, TaskId};
use nimbus_reconcile::DEFAULT_FLUSH_INTERVAL;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::ContextAggregator;

/// Errors persisting one task bucket.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to encode context: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("coordination store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid flush configuration: {0}")]
    InvalidConfig(String),
}

/// Flush loop configuration.
#[derive(Debug, Clone)]
pub struct FlushConfig {
    /// Time between flushes. The first flush runs one interval after start.
    pub interval: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Outcome of one flush cycle.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Buckets written to the store.
    pub written: usize,

    /// Buckets that failed, retried next cycle.
    pub failed: Vec<(JobId, TaskId, ContextError)>,
}

/// Shortest period the loop will tick at.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Writes every task bucket to `<root>/customercontext/<job>/<task>`.
///
/// Holds the aggregator weakly so a running loop does not keep it alive.
pub struct ContextFlusher {
    aggregator: Weak<ContextAggregator>,
    store: Arc<dyn CoordinationStore>,
    layout: StoreLayout,
    config: FlushConfig,
}

impl ContextFlusher {
    pub fn new(
        aggregator: &Arc<ContextAggregator>,
        store: Arc<dyn CoordinationStore>,
        layout: StoreLayout,
        config: FlushConfig,
    ) -> Self {
        Self {
            aggregator: Arc::downgrade(aggregator),
            store,
            layout,
            config,
        }
    }

    /// Flush on every interval until shutdown is signalled, the sender is
    /// dropped or the aggregator is gone.
    #[instrument(skip_all, name = "context_flush")]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            "Starting context flush loop"
        );

        let period = self.config.interval.max(MIN_INTERVAL);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.aggregator.strong_count() == 0 {
                        info!("Context aggregator dropped, stopping flush loop");
                        break;
                    }
                    self.flush_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Context flush loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Persist every bucket once. A failing bucket does not stop the others.
    pub async fn flush_once(&self) -> FlushReport {
        let mut report = FlushReport::default();
        let Some(aggregator) = self.aggregator.upgrade() else {
            return report;
        };
        let buckets = aggregator.buckets();
        drop(aggregator);

        for (job, task, bucket) in buckets {
            let encoded = {
                let entries = bucket.lock().unwrap_or_else(PoisonError::into_inner);
                serde_json::to_vec(&*entries)
            };

            let result = match encoded {
                Ok(data) => self.write(&job, task, &data).await,
                Err(e) => Err(e.into()),
            };

            match result {
                Ok(()) => report.written += 1,
                Err(e) => {
                    warn!(job_id = %job, task_id = %task, error = %e, "Failed to flush task context");
                    report.failed.push((job, task, e));
                }
            }
        }

        debug!(
            written = report.written,
            failed = report.failed.len(),
            "Context flush complete"
        );
        report
    }

    async fn write(&self, job: &JobId, task: TaskId, data: &[u8]) -> Result<(), ContextError> {
        let path = self.layout.task_context(job, task);
        self.store.mkdirs(&path).await?;
        self.store.set(&path, data).await?;
        Ok(())
    }
}
