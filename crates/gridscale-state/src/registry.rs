//! Watcher registry — one job status watcher per job.
//!
//! The slot map is only touched under its mutex, and the mutex is never
//! held across a network wait: `ensure_watcher` takes a clone of the
//! slot's readiness receiver under the lock and waits on it after
//! releasing it. Concurrent callers for the same job therefore share a
//! single watcher, and the watcher's own callback may call
//! `remove_watcher` while callers are still waiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gridscale_orchestrator::{Orchestrator, RetryPolicy};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::error::{StateError, StateResult};
use crate::watcher::{ErrorCallback, JobStatusWatcher, StatusCallback};

/// A running watcher.
struct WatcherSlot {
    /// Shutdown signal for this watcher.
    shutdown_tx: watch::Sender<bool>,
    /// Flips to `true` after the first update has been processed.
    ready_rx: watch::Receiver<bool>,
    /// Handle to the background watch task.
    handle: JoinHandle<()>,
}

/// Owns the set of active job status watchers.
pub struct WatcherRegistry<O> {
    orchestrator: Arc<O>,
    retry: RetryPolicy,
    wait_time: Option<Duration>,
    on_error: Option<ErrorCallback>,
    /// Active watchers: job_id → slot.
    slots: Mutex<HashMap<String, WatcherSlot>>,
}

impl<O: Orchestrator> WatcherRegistry<O> {
    pub fn new(orchestrator: Arc<O>) -> Self {
        Self {
            orchestrator,
            retry: RetryPolicy::default(),
            wait_time: None,
            on_error: None,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Set the retry policy handed to new watchers.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the blocking-query wait time handed to new watchers.
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = Some(wait_time);
        self
    }

    /// Set a callback for failed status queries.
    pub fn with_error_callback(mut self, on_error: ErrorCallback) -> Self {
        self.on_error = Some(on_error);
        self
    }

    /// Make sure a watcher is running for `job_id` and wait for its first
    /// processed update.
    ///
    /// An existing watcher is reused. Returns
    /// [`StateError::WatcherEnded`] if the watcher stops before its first
    /// load (for example because it was removed).
    pub async fn ensure_watcher(&self, job_id: &str, callback: StatusCallback) -> StateResult<()> {
        let mut ready = {
            let mut slots = self.slots.lock().await;
            match slots.get(job_id) {
                Some(slot) if !slot.handle.is_finished() => {
                    trace!(%job_id, "found existing job status watcher");
                    slot.ready_rx.clone()
                }
                _ => {
                    debug!(%job_id, "starting new job status watcher");
                    let slot = self.spawn(job_id, callback);
                    let ready = slot.ready_rx.clone();
                    slots.insert(job_id.to_string(), slot);
                    ready
                }
            }
        };

        ready
            .wait_for(|loaded| *loaded)
            .await
            .map(|_| ())
            .map_err(|_| StateError::WatcherEnded {
                job_id: job_id.to_string(),
            })
    }

    fn spawn(&self, job_id: &str, callback: StatusCallback) -> WatcherSlot {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = watch::channel(false);

        let watcher = JobStatusWatcher::new(job_id, self.orchestrator.clone(), callback)
            .with_retry(self.retry)
            .with_wait_time(self.wait_time)
            .with_error_callback(self.on_error.clone());
        let handle = tokio::spawn(watcher.run(ready_tx, shutdown_rx));

        WatcherSlot {
            shutdown_tx,
            ready_rx,
            handle,
        }
    }
}

impl<O> WatcherRegistry<O> {
    /// Remove the watcher for `job_id` and signal it to stop. Returns true
    /// if one was registered.
    ///
    /// An in-flight blocking query is abandoned at once rather than left
    /// to reach its timeout.
    pub async fn remove_watcher(&self, job_id: &str) -> bool {
        let mut slots = self.slots.lock().await;
        match slots.remove(job_id) {
            Some(slot) => {
                let _ = slot.shutdown_tx.send(true);
                debug!(%job_id, "removed job status watcher");
                true
            }
            None => false,
        }
    }

    /// Whether a watcher is registered for `job_id`.
    pub async fn is_watching(&self, job_id: &str) -> bool {
        self.slots.lock().await.contains_key(job_id)
    }

    /// Job IDs with a registered watcher, sorted.
    pub async fn active_watchers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.slots.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop every watcher and wait for their tasks to finish.
    pub async fn shutdown_all(&self) {
        let drained: Vec<(String, WatcherSlot)> = self.slots.lock().await.drain().collect();
        for (_, slot) in &drained {
            let _ = slot.shutdown_tx.send(true);
        }
        // The lock is released here: a watcher finishing its callback may
        // still call back into the registry.
        for (job_id, slot) in drained {
            let _ = slot.handle.await;
            debug!(%job_id, "job status watcher stopped");
        }
        info!("all job status watchers stopped");
    }
}
