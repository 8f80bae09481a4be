//! Job status handler — applies watcher updates to local state.
//!
//! A running job's update replaces its stored status. A stopped job's
//! update drops its policies, its watcher and its status; if the job is
//! started again everything is rebuilt from the orchestrator.

use std::sync::{Arc, Weak};

use gridscale_orchestrator::{JobScaleStatus, Orchestrator};
use tracing::debug;

use crate::error::StateResult;
use crate::policies::PolicyStore;
use crate::registry::WatcherRegistry;
use crate::status::JobStatusStore;
use crate::watcher::status_callback;

/// Reconciles job scale status updates into local state.
///
/// Cloning is cheap; clones share state.
pub struct JobStatusHandler<O> {
    inner: Arc<HandlerInner<O>>,
}

impl<O> Clone for JobStatusHandler<O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct HandlerInner<O> {
    registry: WatcherRegistry<O>,
    statuses: JobStatusStore,
    policies: Arc<dyn PolicyStore>,
}

impl<O: Orchestrator> JobStatusHandler<O> {
    pub fn new(registry: WatcherRegistry<O>, policies: Arc<dyn PolicyStore>) -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                registry,
                statuses: JobStatusStore::new(),
                policies,
            }),
        }
    }

    /// Start a status watcher for `job_id` if none is running, and wait
    /// until its first update has been applied.
    ///
    /// Call before evaluating any policy of the job.
    pub async fn ensure_watcher(&self, job_id: &str) -> StateResult<()> {
        // The watcher only holds a weak handle so a dropped handler does
        // not stay alive through its own watchers.
        let handler: Weak<HandlerInner<O>> = Arc::downgrade(&self.inner);
        let callback = status_callback(move |update| {
            let handler = handler.clone();
            async move {
                if let Some(handler) = handler.upgrade() {
                    handler.on_update(update).await;
                }
            }
        });
        self.inner.registry.ensure_watcher(job_id, callback).await
    }

    /// Apply one job scale status update.
    pub async fn on_update(&self, update: JobScaleStatus) {
        self.inner.on_update(update).await;
    }

    /// Latest known scale status of a job.
    pub async fn job_status(&self, job_id: &str) -> Option<JobScaleStatus> {
        self.inner.statuses.get_job(job_id).await
    }

    pub fn statuses(&self) -> &JobStatusStore {
        &self.inner.statuses
    }

    pub fn registry(&self) -> &WatcherRegistry<O> {
        &self.inner.registry
    }

    /// Stop every watcher.
    pub async fn shutdown(&self) {
        self.inner.registry.shutdown_all().await;
    }
}

impl<O> HandlerInner<O> {
    async fn on_update(&self, update: JobScaleStatus) {
        if update.job_stopped {
            let removed = self.policies.delete_policies(&update.job_id).await;
            self.registry.remove_watcher(&update.job_id).await;
            // Runs after the watcher is gone: a watcher started for the same
            // job in between would lose its first status here.
            self.statuses.delete_job(&update.job_id).await;
            debug!(job_id = %update.job_id, policies = removed, "job is stopped, removed internal state");
        } else {
            let job_id = update.job_id.clone();
            self.statuses.set_job(update).await;
            debug!(%job_id, "set scale status in state");
        }
    }
}
