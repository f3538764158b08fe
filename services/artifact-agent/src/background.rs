//! Owned handles for long-lived background loops.
//!
//! A `BackgroundTask` starts its loop at most once no matter how many callers
//! race on `ensure_started`, and can stop it through a watch channel.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Start-once handle for a background loop.
pub struct BackgroundTask {
    /// Loop name for logging.
    name: &'static str,

    /// Set by the single caller that wins the right to spawn.
    started: AtomicBool,

    /// Shutdown sender; the loop holds a subscribed receiver.
    shutdown_tx: watch::Sender<bool>,

    /// Task handle, present while the loop is owned by this handle.
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundTask {
    /// Create a handle. Nothing is spawned until `ensure_started`.
    pub fn new(name: &'static str) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            name,
            started: AtomicBool::new(false),
            shutdown_tx,
            handle: Mutex::new(None),
        }
    }

    /// Spawn the loop unless it was already started.
    ///
    /// `make` receives the shutdown receiver and is only invoked by the caller
    /// that wins the start race. Returns true if this call started the loop.
    /// Must be called from within a Tokio runtime.
    pub fn ensure_started<F, Fut>(&self, make: F) -> bool
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(task = self.name, "Background task already started");
            return false;
        }

        if *self.shutdown_tx.borrow() {
            debug!(task = self.name, "Background task shut down before start");
            return false;
        }

        let handle = tokio::spawn(make(self.shutdown_tx.subscribe()));
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!(task = self.name, "Background task started");
        true
    }

    /// Returns true once the loop has been started, even if it later stopped.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Returns true while the loop task is alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the loop to stop and wait for it to exit.
    ///
    /// A stopped task is not restarted by later `ensure_started` calls.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            match handle.await {
                Ok(()) => info!(task = self.name, "Background task stopped"),
                Err(e) if e.is_cancelled() => debug!(task = self.name, "Background task cancelled"),
                Err(e) => error!(task = self.name, error = %e, "Background task panicked"),
            }
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_starts_once() {
        let task = BackgroundTask::new("test");
        let spawned = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let spawned = Arc::clone(&spawned);
            task.ensure_started(move |shutdown| async move {
                spawned.fetch_add(1, Ordering::SeqCst);
                wait_for_shutdown(shutdown).await;
            });
        }

        tokio::task::yield_now().await;
        assert!(task.is_started());
        assert!(task.is_running());

        task.shutdown().await;
        assert!(!task.is_running());
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_start_race() {
        let task = Arc::new(BackgroundTask::new("race"));
        let spawned = Arc::new(AtomicUsize::new(0));

        let mut joins = Vec::new();
        for _ in 0..16 {
            let task = Arc::clone(&task);
            let spawned = Arc::clone(&spawned);
            joins.push(tokio::spawn(async move {
                task.ensure_started(move |shutdown| async move {
                    spawned.fetch_add(1, Ordering::SeqCst);
                    wait_for_shutdown(shutdown).await;
                })
            }));
        }

        let mut winners = 0;
        for join in joins {
            if join.await.unwrap() {
                winners += 1;
            }
        }

        task.shutdown().await;
        assert_eq!(winners, 1);
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_prevents_start() {
        let task = BackgroundTask::new("early-stop");
        task.shutdown().await;

        let started = task.ensure_started(|shutdown| async move {
            wait_for_shutdown(shutdown).await;
        });
        assert!(!started);
        assert!(!task.is_running());

        assert!(!task.ensure_started(|shutdown| async move {
            wait_for_shutdown(shutdown).await;
        }));
    }

    #[tokio::test]
    async fn test_not_started() {
        let task = BackgroundTask::new("idle");
        assert!(!task.is_started());
        assert!(!task.is_running());
        task.shutdown().await;
    }
}
