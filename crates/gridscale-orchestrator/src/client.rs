//! The orchestrator client interface.

use async_trait::async_trait;

use crate::blocking::{QueryMeta, QueryOptions};
use crate::error::OrchestratorResult;
use crate::types::{JobScaleStatus, ScalingPolicy, ScalingPolicyStub};

/// Read access to the orchestrator's scaling API.
///
/// Methods taking [`QueryOptions`] are blocking queries: with a non-zero
/// `wait_index` the implementation holds the call until its state moves
/// past that index or the wait time elapses, and returns the current state
/// either way.
#[async_trait]
pub trait Orchestrator: Send + Sync + 'static {
    /// List summaries of all scaling policies.
    async fn list_policies(
        &self,
        opts: &QueryOptions,
    ) -> OrchestratorResult<(Vec<ScalingPolicyStub>, QueryMeta)>;

    /// Fetch one raw scaling policy document.
    async fn get_policy(&self, id: &str) -> OrchestratorResult<ScalingPolicy>;

    /// Fetch the scale status of a job.
    async fn job_scale_status(
        &self,
        job_id: &str,
        opts: &QueryOptions,
    ) -> OrchestratorResult<(JobScaleStatus, QueryMeta)>;
}
