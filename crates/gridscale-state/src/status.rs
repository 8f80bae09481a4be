//! Job status table — latest scale status per job.

use std::collections::HashMap;
use std::sync::Arc;

use gridscale_orchestrator::JobScaleStatus;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory table of the latest scale status of every watched job.
///
/// Writes are keyed by job ID, so updates from different jobs' watchers
/// never contend for the same entry.
#[derive(Clone, Default)]
pub struct JobStatusStore {
    jobs: Arc<RwLock<HashMap<String, JobScaleStatus>>>,
}

impl JobStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the status of `status.job_id`.
    pub async fn set_job(&self, status: JobScaleStatus) {
        let mut jobs = self.jobs.write().await;
        debug!(job_id = %status.job_id, index = status.job_modify_index, "job status stored");
        jobs.insert(status.job_id.clone(), status);
    }

    pub async fn get_job(&self, job_id: &str) -> Option<JobScaleStatus> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Delete a job's status. Returns true if it existed.
    pub async fn delete_job(&self, job_id: &str) -> bool {
        let existed = self.jobs.write().await.remove(job_id).is_some();
        debug!(%job_id, existed, "job status deleted");
        existed
    }

    /// IDs of all jobs with a stored status, sorted.
    pub async fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.jobs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
