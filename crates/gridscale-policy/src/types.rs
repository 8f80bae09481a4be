//! Typed scaling policy model.

use std::collections::BTreeMap;
use std::time::Duration;

use gridscale_orchestrator::ScalingPolicyStub;
use serde::{Deserialize, Serialize};

/// A fully typed, defaulted scaling policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    /// Metrics backend. Never empty after normalization.
    pub source: String,
    /// Backend-specific metric query.
    pub query: String,
    /// Evaluation interval. Zero means the agent-wide default.
    pub interval: Duration,
    pub target: Target,
    pub strategy: Strategy,
}

/// Lightweight policy summary used for change detection.
///
/// The content of a policy is always fetched separately by ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyListStub {
    pub id: String,
    /// Job the policy scales.
    pub job_id: String,
}

impl From<ScalingPolicyStub> for PolicyListStub {
    fn from(stub: ScalingPolicyStub) -> Self {
        Self {
            id: stub.id,
            job_id: stub.job_id,
        }
    }
}

/// Decision algorithm used to compute a desired count.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub min: i64,
    pub max: i64,
    /// Driver-specific parameters, every value stringified.
    pub config: BTreeMap<String, String>,
}

/// Backend that changes a workload's instance count.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Target {
    /// Empty until resolved by canonicalization.
    pub name: String,
    /// `None` when the document carried no target config.
    pub config: Option<BTreeMap<String, String>>,
}
