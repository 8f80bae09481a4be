//! Wire types returned by the orchestrator.
//!
//! These mirror the orchestrator's scaling API. The policy document itself
//! is kept weakly typed (`serde_json::Map`) because it is produced by a
//! declarative config parser; turning it into a typed policy is the job of
//! the policy normalizer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a scaling policy, assigned by the orchestrator.
pub type PolicyId = String;

/// Unique identifier for a job.
pub type JobId = String;

// ── Scaling policies ──────────────────────────────────────────────

/// A full scaling policy as stored by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingPolicy {
    pub id: PolicyId,
    /// Job the policy belongs to.
    pub job_id: JobId,
    /// Slash-delimited target path, e.g. `default/web/group/web`.
    pub target: String,
    /// Raw policy document: `source`, `query`, `interval`, `strategy`, `target`.
    #[serde(default)]
    pub policy: serde_json::Map<String, serde_json::Value>,
}

/// Summary entry returned when listing scaling policies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScalingPolicyStub {
    pub id: PolicyId,
    pub job_id: JobId,
    pub target: String,
    /// Index of the last write to this policy.
    pub modify_index: u64,
}

impl ScalingPolicy {
    /// Build the list summary for this policy.
    pub fn stub(&self, modify_index: u64) -> ScalingPolicyStub {
        ScalingPolicyStub {
            id: self.id.clone(),
            job_id: self.job_id.clone(),
            target: self.target.clone(),
            modify_index,
        }
    }
}

// ── Job scale status ──────────────────────────────────────────────

/// Scale status of a job and its task groups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct JobScaleStatus {
    pub job_id: JobId,
    /// True once the job has been stopped; all autoscaler state for it is
    /// then discarded.
    pub job_stopped: bool,
    /// Per task group counts, keyed by group name.
    #[serde(default)]
    pub task_groups: HashMap<String, TaskGroupScaleStatus>,
    /// Index of the last write to this job.
    #[serde(default)]
    pub job_modify_index: u64,
}

/// Allocation counts for a single task group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TaskGroupScaleStatus {
    pub desired: u32,
    pub placed: u32,
    pub running: u32,
    pub healthy: u32,
    pub unhealthy: u32,
}

impl JobScaleStatus {
    /// Status of a running job with no task group data.
    pub fn running(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            ..Self::default()
        }
    }

    /// Status reporting that a job has been stopped.
    pub fn stopped(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            job_stopped: true,
            ..Self::default()
        }
    }

    /// Builder-style helper for attaching a task group.
    pub fn with_group(mut self, name: &str, status: TaskGroupScaleStatus) -> Self {
        self.task_groups.insert(name.to_string(), status);
        self
    }
}
