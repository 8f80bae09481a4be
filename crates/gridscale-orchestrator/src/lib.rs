//! gridscale-orchestrator — the orchestrator query API consumed by the
//! autoscaler state core.
//!
//! Every read supports index-based blocking ("long-poll") queries: the
//! caller passes the last index it has seen and the orchestrator holds the
//! request open until its state moves past that index or the wait time
//! elapses.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator (trait)
//!   ├── list_policies(QueryOptions)       → (Vec<ScalingPolicyStub>, QueryMeta)
//!   ├── get_policy(id)                    → ScalingPolicy (raw document)
//!   └── job_scale_status(job, QueryOptions) → (JobScaleStatus, QueryMeta)
//!
//! InMemoryOrchestrator   reference implementation with real blocking semantics
//! IndexCursor            monotonic long-poll cursor
//! RetryPolicy            pause between failed blocking queries
//! ```

pub mod blocking;
pub mod client;
pub mod error;
pub mod memory;
pub mod types;

pub use blocking::{shutdown_signalled, IndexCursor, QueryMeta, QueryOptions, RetryPolicy};
pub use client::Orchestrator;
pub use error::{OrchestratorError, OrchestratorResult};
pub use memory::InMemoryOrchestrator;
pub use types::*;
