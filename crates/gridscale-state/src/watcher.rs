//! Job status watcher — long-polls one job's scale status.
//!
//! The watcher keeps an index cursor, issues blocking status queries past
//! it and hands every successful response to its [`StatusCallback`]. Its
//! readiness signal flips to `true` once, after the first callback has
//! returned. It stops when its shutdown signal fires or after it has
//! delivered a status reporting the job as stopped.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use gridscale_orchestrator::{
    shutdown_signalled, IndexCursor, JobScaleStatus, Orchestrator, OrchestratorError, RetryPolicy,
};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Callback invoked with every status fetched by a watcher.
pub type StatusCallback = Arc<dyn Fn(JobScaleStatus) -> BoxFuture + Send + Sync>;

/// Callback invoked with every failed status query (job ID, error).
pub type ErrorCallback = Arc<dyn Fn(&str, &OrchestratorError) + Send + Sync>;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Wrap an async closure as a [`StatusCallback`].
pub fn status_callback<F, Fut>(f: F) -> StatusCallback
where
    F: Fn(JobScaleStatus) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |status| -> BoxFuture { Box::pin(f(status)) })
}

/// Background long-poll over one job's scale status.
pub struct JobStatusWatcher<O> {
    job_id: String,
    orchestrator: Arc<O>,
    callback: StatusCallback,
    on_error: Option<ErrorCallback>,
    retry: RetryPolicy,
    wait_time: Option<Duration>,
}

impl<O: Orchestrator> JobStatusWatcher<O> {
    pub fn new(job_id: &str, orchestrator: Arc<O>, callback: StatusCallback) -> Self {
        Self {
            job_id: job_id.to_string(),
            orchestrator,
            callback,
            on_error: None,
            retry: RetryPolicy::default(),
            wait_time: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_wait_time(mut self, wait_time: Option<Duration>) -> Self {
        self.wait_time = wait_time;
        self
    }

    pub fn with_error_callback(mut self, on_error: Option<ErrorCallback>) -> Self {
        self.on_error = on_error;
        self
    }

    /// Run the watch loop.
    ///
    /// `ready` is set to `true` after the first successful status has been
    /// processed by the callback. Dropping `ready` without setting it tells
    /// waiters the watcher ended before its first load.
    pub async fn run(self, ready: watch::Sender<bool>, mut shutdown: watch::Receiver<bool>) {
        let mut cursor = IndexCursor::new();
        let mut failures: u32 = 0;

        debug!(job_id = %self.job_id, "job status watcher starting");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let opts = cursor.query(self.wait_time);
            let result = tokio::select! {
                result = self.orchestrator.job_scale_status(&self.job_id, &opts) => result,
                _ = shutdown_signalled(&mut shutdown) => break,
            };

            match result {
                Ok((status, meta)) => {
                    failures = 0;
                    cursor.advance(meta.last_index);
                    let stopped = status.job_stopped;

                    (self.callback)(status).await;

                    // One-shot: only the first load notifies waiters.
                    ready.send_if_modified(|loaded| !std::mem::replace(loaded, true));

                    if stopped {
                        debug!(job_id = %self.job_id, "job stopped");
                        break;
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!(
                        job_id = %self.job_id,
                        error = %e,
                        index = cursor.index(),
                        attempt = failures,
                        "job scale status query failed"
                    );
                    if let Some(ref on_error) = self.on_error {
                        on_error(&self.job_id, &e);
                    }
                    tokio::select! {
                        _ = self.retry.wait(failures) => {}
                        _ = shutdown_signalled(&mut shutdown) => break,
                    }
                }
            }
        }

        debug!(job_id = %self.job_id, "job status watcher stopped");
    }
}
