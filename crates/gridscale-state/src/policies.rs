//! Policy storage held for each job.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gridscale_policy::Policy;
use tokio::sync::RwLock;
use tracing::debug;

/// Storage of loaded policies that can drop everything for a job.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Remove every policy of `job_id`. Returns how many were removed.
    async fn delete_policies(&self, job_id: &str) -> usize;
}

/// In-memory policy storage keyed by job, then by policy ID.
#[derive(Clone, Default)]
pub struct PolicyCache {
    jobs: Arc<RwLock<HashMap<String, HashMap<String, Policy>>>>,
}

impl PolicyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a policy for a job.
    pub async fn insert(&self, job_id: &str, policy: Policy) {
        let mut jobs = self.jobs.write().await;
        debug!(%job_id, policy_id = %policy.id, "policy cached");
        jobs.entry(job_id.to_string())
            .or_default()
            .insert(policy.id.clone(), policy);
    }

    /// Look up a policy by ID across all jobs.
    pub async fn get(&self, policy_id: &str) -> Option<Policy> {
        let jobs = self.jobs.read().await;
        jobs.values().find_map(|policies| policies.get(policy_id).cloned())
    }

    /// All policies of a job, sorted by ID.
    pub async fn policies_for_job(&self, job_id: &str) -> Vec<Policy> {
        let jobs = self.jobs.read().await;
        let mut policies: Vec<Policy> = jobs
            .get(job_id)
            .map(|policies| policies.values().cloned().collect())
            .unwrap_or_default();
        policies.sort_by(|a, b| a.id.cmp(&b.id));
        policies
    }

    /// Total number of cached policies.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.values().map(HashMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PolicyStore for PolicyCache {
    async fn delete_policies(&self, job_id: &str) -> usize {
        let removed = self
            .jobs
            .write()
            .await
            .remove(job_id)
            .map_or(0, |policies| policies.len());
        debug!(%job_id, removed, "job policies deleted");
        removed
    }
}
