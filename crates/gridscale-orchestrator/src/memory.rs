//! InMemoryOrchestrator — an orchestrator held entirely in memory.
//!
//! Implements real blocking-query semantics: every write bumps a global
//! index and wakes blocked readers, and a blocked read returns as soon as
//! the index it depends on moves past the caller's `wait_index` (or the
//! wait time elapses). Failures can be injected per query kind so retry
//! paths can be exercised.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::blocking::{QueryMeta, QueryOptions};
use crate::client::Orchestrator;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::*;

/// Wait time applied when a blocking query does not set one.
pub const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(300);

/// Cloneable in-memory orchestrator. Clones share state.
#[derive(Clone)]
pub struct InMemoryOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<MemoryState>,
    /// Broadcasts the global index after every write.
    changes: watch::Sender<u64>,
    default_wait: Duration,
}

#[derive(Default)]
struct MemoryState {
    index: u64,
    /// Index of the last write to the policy set.
    policies_index: u64,
    policies: BTreeMap<PolicyId, (ScalingPolicy, u64)>,
    jobs: HashMap<JobId, JobScaleStatus>,
    list_failures: VecDeque<OrchestratorError>,
    status_failures: HashMap<JobId, VecDeque<OrchestratorError>>,
    /// (all list queries, non-blocking list queries).
    list_queries: (usize, usize),
    /// job_id → (all status queries, non-blocking status queries).
    status_queries: HashMap<JobId, (usize, usize)>,
}

impl MemoryState {
    fn bump(&mut self) -> u64 {
        self.index += 1;
        self.index
    }
}

impl Default for InMemoryOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrchestrator {
    /// Create an empty orchestrator using [`DEFAULT_WAIT_TIME`].
    pub fn new() -> Self {
        Self::with_default_wait(DEFAULT_WAIT_TIME)
    }

    /// Create an empty orchestrator with a custom default wait time.
    pub fn with_default_wait(default_wait: Duration) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(MemoryState::default()),
                changes,
                default_wait,
            }),
        }
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Insert or replace a scaling policy. Returns the write index.
    pub async fn upsert_policy(&self, policy: ScalingPolicy) -> u64 {
        let index = {
            let mut state = self.inner.state.lock().await;
            let index = state.bump();
            state.policies_index = index;
            debug!(policy_id = %policy.id, index, "policy stored");
            state.policies.insert(policy.id.clone(), (policy, index));
            index
        };
        self.inner.changes.send_replace(index);
        index
    }

    /// Delete a scaling policy. Returns true if it existed.
    pub async fn delete_policy(&self, id: &str) -> bool {
        let (existed, index) = {
            let mut state = self.inner.state.lock().await;
            if state.policies.remove(id).is_none() {
                return false;
            }
            let index = state.bump();
            state.policies_index = index;
            (true, index)
        };
        debug!(policy_id = %id, index, "policy deleted");
        self.inner.changes.send_replace(index);
        existed
    }

    /// Insert or replace the scale status of a job. The status's
    /// `job_modify_index` is overwritten with the write index.
    pub async fn set_job_status(&self, mut status: JobScaleStatus) -> u64 {
        let index = {
            let mut state = self.inner.state.lock().await;
            let index = state.bump();
            status.job_modify_index = index;
            debug!(job_id = %status.job_id, index, stopped = status.job_stopped, "job status stored");
            state.jobs.insert(status.job_id.clone(), status);
            index
        };
        self.inner.changes.send_replace(index);
        index
    }

    // ── Fault injection and observation ────────────────────────────

    /// Make the next `list_policies` call fail with `err`.
    pub async fn fail_next_list(&self, err: OrchestratorError) {
        self.inner.state.lock().await.list_failures.push_back(err);
    }

    /// Make the next `job_scale_status` call for `job_id` fail with `err`.
    pub async fn fail_next_status(&self, job_id: &str, err: OrchestratorError) {
        self.inner
            .state
            .lock()
            .await
            .status_failures
            .entry(job_id.to_string())
            .or_default()
            .push_back(err);
    }

    /// Number of `job_scale_status` calls made for `job_id`.
    pub async fn status_queries(&self, job_id: &str) -> usize {
        let state = self.inner.state.lock().await;
        state.status_queries.get(job_id).map_or(0, |(all, _)| *all)
    }

    /// Number of non-blocking `job_scale_status` calls made for `job_id`.
    ///
    /// Every status watcher starts with exactly one such call, so this
    /// counts the watchers that were ever started for the job.
    pub async fn initial_status_queries(&self, job_id: &str) -> usize {
        let state = self.inner.state.lock().await;
        state.status_queries.get(job_id).map_or(0, |(_, initial)| *initial)
    }

    /// Number of `list_policies` calls made.
    pub async fn list_queries(&self) -> usize {
        self.inner.state.lock().await.list_queries.0
    }

    /// Number of non-blocking `list_policies` calls made.
    pub async fn initial_list_queries(&self) -> usize {
        self.inner.state.lock().await.list_queries.1
    }

    /// Hold a blocking query until `relevant` moves past `opts.wait_index`
    /// or the wait time elapses.
    async fn wait_past<F>(&self, opts: &QueryOptions, relevant: F)
    where
        F: Fn(&MemoryState) -> u64,
    {
        if !opts.is_blocking() {
            return;
        }

        // Subscribe before checking so a write between the check and the
        // select is not missed.
        let mut changes = self.inner.changes.subscribe();
        let deadline = tokio::time::sleep(opts.wait_time.unwrap_or(self.inner.default_wait));
        tokio::pin!(deadline);

        loop {
            if relevant(&*self.inner.state.lock().await) > opts.wait_index {
                return;
            }
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = &mut deadline => return,
            }
        }
    }
}

#[async_trait]
impl Orchestrator for InMemoryOrchestrator {
    async fn list_policies(
        &self,
        opts: &QueryOptions,
    ) -> OrchestratorResult<(Vec<ScalingPolicyStub>, QueryMeta)> {
        {
            let mut state = self.inner.state.lock().await;
            state.list_queries.0 += 1;
            if !opts.is_blocking() {
                state.list_queries.1 += 1;
            }
            if let Some(err) = state.list_failures.pop_front() {
                return Err(err);
            }
        }

        self.wait_past(opts, |state| state.policies_index).await;

        let state = self.inner.state.lock().await;
        let stubs = state
            .policies
            .values()
            .map(|(policy, modify_index)| policy.stub(*modify_index))
            .collect();
        Ok((
            stubs,
            QueryMeta {
                last_index: state.policies_index.max(1),
            },
        ))
    }

    async fn get_policy(&self, id: &str) -> OrchestratorResult<ScalingPolicy> {
        let state = self.inner.state.lock().await;
        state
            .policies
            .get(id)
            .map(|(policy, _)| policy.clone())
            .ok_or_else(|| OrchestratorError::NotFound {
                kind: "scaling policy",
                id: id.to_string(),
            })
    }

    async fn job_scale_status(
        &self,
        job_id: &str,
        opts: &QueryOptions,
    ) -> OrchestratorResult<(JobScaleStatus, QueryMeta)> {
        {
            let mut state = self.inner.state.lock().await;
            let counts = state.status_queries.entry(job_id.to_string()).or_default();
            counts.0 += 1;
            if !opts.is_blocking() {
                counts.1 += 1;
            }
            if let Some(err) = state
                .status_failures
                .get_mut(job_id)
                .and_then(VecDeque::pop_front)
            {
                return Err(err);
            }
        }

        self.wait_past(opts, |state| {
            state.jobs.get(job_id).map_or(0, |job| job.job_modify_index)
        })
        .await;

        let state = self.inner.state.lock().await;
        let status = state
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound {
                kind: "job",
                id: job_id.to_string(),
            })?;
        let last_index = status.job_modify_index.max(1);
        Ok((status, QueryMeta { last_index }))
    }
}
