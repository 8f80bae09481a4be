//! Policy source — list, get and watch scaling policies.
//!
//! `OrchestratorPolicySource` reads policies from an [`Orchestrator`].
//! `notify` starts a background long-poll loop that emits the full policy
//! list every time the orchestrator reports a change past the last seen
//! index. Consecutive emissions may be identical; consumers that care must
//! diff against what they already hold.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gridscale_orchestrator::{
    shutdown_signalled, IndexCursor, Orchestrator, QueryMeta, QueryOptions, RetryPolicy,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{PolicyError, PolicyResult};
use crate::normalize::Normalizer;
use crate::types::{Policy, PolicyListStub};

/// Channels fed by a running notify loop.
///
/// The loop stops when the shutdown signal fires (or its sender is
/// dropped), or when `policies` is dropped. It never stops on a query
/// error.
pub struct PolicyNotifications {
    /// Policy list after every observed change, in index order.
    pub policies: mpsc::Receiver<Vec<PolicyListStub>>,
    /// Failed queries. The loop retries after each one.
    pub errors: mpsc::Receiver<PolicyError>,
    /// Handle of the background loop.
    pub handle: JoinHandle<()>,
}

/// A backend that serves scaling policies.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Fetch summaries of every current policy.
    async fn list(&self) -> PolicyResult<Vec<PolicyListStub>>;

    /// Fetch and normalize one policy.
    async fn get(&self, id: &str) -> PolicyResult<Policy>;

    /// Start a background loop that reports every policy-set change.
    ///
    /// Each call starts an independent loop; the returned channels are not
    /// restartable.
    fn notify(&self, shutdown: watch::Receiver<bool>) -> PolicyNotifications;
}

/// Policy source backed by the orchestrator's scaling API.
pub struct OrchestratorPolicySource<O> {
    orchestrator: Arc<O>,
    normalizer: Normalizer,
    retry: RetryPolicy,
    wait_time: Option<Duration>,
}

impl<O: Orchestrator> OrchestratorPolicySource<O> {
    /// Create a source with default normalization and immediate retry.
    pub fn new(orchestrator: Arc<O>) -> Self {
        Self {
            orchestrator,
            normalizer: Normalizer::default(),
            retry: RetryPolicy::default(),
            wait_time: None,
        }
    }

    /// Set the normalizer used by `get`.
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Set the pause between failed blocking queries.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the wait time sent with every blocking query.
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = Some(wait_time);
        self
    }
}

#[async_trait]
impl<O: Orchestrator> PolicySource for OrchestratorPolicySource<O> {
    async fn list(&self) -> PolicyResult<Vec<PolicyListStub>> {
        let (stubs, _) = list_stubs(self.orchestrator.as_ref(), &QueryOptions::immediate()).await?;
        Ok(stubs)
    }

    async fn get(&self, id: &str) -> PolicyResult<Policy> {
        let raw = self.orchestrator.get_policy(id).await?;
        self.normalizer.normalize(&raw)
    }

    fn notify(&self, shutdown: watch::Receiver<bool>) -> PolicyNotifications {
        let (policies_tx, policies) = mpsc::channel(1);
        let (errors_tx, errors) = mpsc::channel(1);

        let orchestrator = self.orchestrator.clone();
        let retry = self.retry;
        let wait_time = self.wait_time;

        let handle = tokio::spawn(async move {
            run_notify_loop(orchestrator, retry, wait_time, policies_tx, errors_tx, shutdown).await;
        });

        PolicyNotifications {
            policies,
            errors,
            handle,
        }
    }
}

async fn list_stubs<O: Orchestrator>(
    orchestrator: &O,
    opts: &QueryOptions,
) -> PolicyResult<(Vec<PolicyListStub>, QueryMeta)> {
    let (stubs, meta) = orchestrator.list_policies(opts).await?;
    Ok((stubs.into_iter().map(PolicyListStub::from).collect(), meta))
}

/// The blocking list loop behind `notify`.
async fn run_notify_loop<O: Orchestrator>(
    orchestrator: Arc<O>,
    retry: RetryPolicy,
    wait_time: Option<Duration>,
    policies_tx: mpsc::Sender<Vec<PolicyListStub>>,
    errors_tx: mpsc::Sender<PolicyError>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut cursor = IndexCursor::new();
    let mut failures: u32 = 0;

    debug!("policy notify loop starting");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let opts = cursor.query(wait_time);
        let result = tokio::select! {
            result = list_stubs(orchestrator.as_ref(), &opts) => result,
            _ = shutdown_signalled(&mut shutdown) => break,
        };

        match result {
            Ok((stubs, meta)) => {
                failures = 0;
                cursor.advance(meta.last_index);
                debug!(index = cursor.index(), policies = stubs.len(), "policy list changed");

                tokio::select! {
                    sent = policies_tx.send(stubs) => {
                        if sent.is_err() {
                            debug!("policy receiver dropped");
                            break;
                        }
                    }
                    _ = shutdown_signalled(&mut shutdown) => break,
                }
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                warn!(error = %e, index = cursor.index(), attempt = failures, "policy list query failed");

                // A dropped error receiver is not a reason to stop watching.
                tokio::select! {
                    _ = errors_tx.send(e) => {}
                    _ = shutdown_signalled(&mut shutdown) => break,
                }
                tokio::select! {
                    _ = retry.wait(failures) => {}
                    _ = shutdown_signalled(&mut shutdown) => break,
                }
            }
        }
    }

    debug!("policy notify loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridscale_orchestrator::{InMemoryOrchestrator, OrchestratorError, ScalingPolicy};
    use serde_json::json;

    const STEP: Duration = Duration::from_secs(5);

    fn raw_policy(id: &str, job: &str) -> ScalingPolicy {
        ScalingPolicy {
            id: id.to_string(),
            job_id: job.to_string(),
            target: format!("default/{job}/{job}-group/{job}"),
            policy: json!({
                "query": "avg_cpu",
                "strategy": [{ "name": "target-value", "min": 1, "max": 5, "config": [{ "target": 70 }] }],
            })
            .as_object()
            .cloned()
            .unwrap(),
        }
    }

    fn source(orch: &InMemoryOrchestrator) -> OrchestratorPolicySource<InMemoryOrchestrator> {
        OrchestratorPolicySource::new(Arc::new(orch.clone())).with_wait_time(STEP)
    }

    async fn next_policies(notifications: &mut PolicyNotifications) -> Vec<PolicyListStub> {
        tokio::time::timeout(STEP, notifications.policies.recv())
            .await
            .expect("timed out waiting for policies")
            .expect("notify loop ended")
    }

    async fn wait_for_list_queries(orch: &InMemoryOrchestrator, count: usize) {
        tokio::time::timeout(STEP, async {
            while orch.list_queries().await < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for list queries");
    }

    #[tokio::test]
    async fn list_returns_stubs() {
        let orch = InMemoryOrchestrator::new();
        orch.upsert_policy(raw_policy("p1", "web")).await;

        let stubs = source(&orch).list().await.unwrap();
        assert_eq!(
            stubs,
            vec![PolicyListStub {
                id: "p1".to_string(),
                job_id: "web".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn list_propagates_transport_errors() {
        let orch = InMemoryOrchestrator::new();
        orch.fail_next_list(OrchestratorError::Transport("down".into())).await;

        let err = source(&orch).list().await.unwrap_err();
        assert!(matches!(err, PolicyError::Orchestrator(_)));
    }

    #[tokio::test]
    async fn get_normalizes_and_is_idempotent() {
        let orch = InMemoryOrchestrator::new();
        orch.upsert_policy(raw_policy("p1", "web")).await;
        let source = source(&orch);

        let first = source.get("p1").await.unwrap();
        let second = source.get("p1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.query, format!("{}/web/web-group/avg", crate::normalize::CPU_METRIC));
        assert_eq!(first.strategy.config["target"], "70");
    }

    #[tokio::test]
    async fn get_reports_validation_errors() {
        let orch = InMemoryOrchestrator::new();
        let mut policy = raw_policy("p1", "web");
        policy.policy.remove("strategy");
        orch.upsert_policy(policy).await;

        let err = source(&orch).get("p1").await.unwrap_err();
        assert!(err.field_errors().unwrap().has_field("strategy"));
    }

    #[tokio::test]
    async fn get_missing_policy_is_orchestrator_error() {
        let orch = InMemoryOrchestrator::new();
        let err = source(&orch).get("nope").await.unwrap_err();
        assert!(matches!(
            err,
            PolicyError::Orchestrator(OrchestratorError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn notify_emits_initial_list_then_changes() {
        let orch = InMemoryOrchestrator::new();
        orch.upsert_policy(raw_policy("p1", "web")).await;

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut notifications = source(&orch).notify(shutdown_rx);

        let initial = next_policies(&mut notifications).await;
        assert_eq!(initial.len(), 1);

        orch.upsert_policy(raw_policy("p2", "api")).await;
        let changed = next_policies(&mut notifications).await;
        let ids: Vec<_> = changed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);

        orch.delete_policy("p1").await;
        let changed = next_policies(&mut notifications).await;
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id, "p2");
    }

    #[tokio::test]
    async fn notify_reports_errors_and_keeps_going() {
        let orch = InMemoryOrchestrator::new();
        orch.upsert_policy(raw_policy("p1", "web")).await;
        orch.fail_next_list(OrchestratorError::Transport("down".into())).await;

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut notifications = source(&orch).notify(shutdown_rx);

        let err = tokio::time::timeout(STEP, notifications.errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            err,
            PolicyError::Orchestrator(OrchestratorError::Transport("down".into()))
        );

        // The cursor did not move, so the retry is non-blocking and
        // returns the current list straight away.
        let policies = next_policies(&mut notifications).await;
        assert_eq!(policies.len(), 1);
    }

    #[tokio::test]
    async fn notify_error_keeps_cursor_position() {
        let orch = InMemoryOrchestrator::new();
        orch.upsert_policy(raw_policy("p1", "web")).await;

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut notifications = source(&orch).notify(shutdown_rx);
        next_policies(&mut notifications).await;

        // Wait until the loop is parked in a blocking query.
        wait_for_list_queries(&orch, 2).await;
        orch.fail_next_list(OrchestratorError::Transport("down".into())).await;
        orch.upsert_policy(raw_policy("p2", "api")).await;
        assert_eq!(next_policies(&mut notifications).await.len(), 2);

        // The following query fails; its retry blocks at the same index.
        tokio::time::timeout(STEP, notifications.errors.recv())
            .await
            .unwrap()
            .unwrap();
        wait_for_list_queries(&orch, 4).await;
        assert_eq!(orch.initial_list_queries().await, 1);
        assert!(notifications.policies.try_recv().is_err());

        orch.upsert_policy(raw_policy("p3", "db")).await;
        assert_eq!(next_policies(&mut notifications).await.len(), 3);
        assert_eq!(orch.initial_list_queries().await, 1);
    }

    #[tokio::test]
    async fn notify_ignores_false_shutdown_value() {
        let orch = InMemoryOrchestrator::new();
        orch.upsert_policy(raw_policy("p1", "web")).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut notifications = source(&orch).notify(shutdown_rx);
        next_policies(&mut notifications).await;

        shutdown_tx.send(false).unwrap();
        orch.upsert_policy(raw_policy("p2", "api")).await;
        assert_eq!(next_policies(&mut notifications).await.len(), 2);
        assert!(!notifications.handle.is_finished());
    }

    #[tokio::test]
    async fn notify_stops_on_shutdown() {
        let orch = InMemoryOrchestrator::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut notifications = source(&orch).notify(shutdown_rx);

        next_policies(&mut notifications).await;
        // The loop is now parked in a blocking query.
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(STEP, notifications.handle)
            .await
            .expect("notify loop did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn notify_stops_when_receiver_dropped() {
        let orch = InMemoryOrchestrator::new();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let PolicyNotifications {
            policies, handle, ..
        } = source(&orch).notify(shutdown_rx);
        drop(policies);

        tokio::time::timeout(STEP, handle)
            .await
            .expect("notify loop did not stop")
            .unwrap();
    }
}
