//! Blocking-query primitives shared by every long-poll loop.
//!
//! A long-poll loop holds an [`IndexCursor`], asks the orchestrator for
//! changes past it, advances it on success and consults a [`RetryPolicy`]
//! on failure. The cursor is never advanced by a failed query.

use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

/// Options for a (possibly blocking) orchestrator query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions {
    /// Last index seen by the caller. Zero never blocks.
    pub wait_index: u64,
    /// Upper bound on how long the orchestrator may hold the request.
    /// `None` uses the orchestrator's own default.
    pub wait_time: Option<Duration>,
}

impl QueryOptions {
    /// A non-blocking query.
    pub fn immediate() -> Self {
        Self::default()
    }

    /// A query that blocks until state moves past `wait_index`.
    pub fn blocking(wait_index: u64, wait_time: Option<Duration>) -> Self {
        Self {
            wait_index,
            wait_time,
        }
    }

    /// Whether the orchestrator is allowed to hold this request.
    pub fn is_blocking(&self) -> bool {
        self.wait_index > 0
    }
}

/// Metadata returned with every query response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryMeta {
    /// Index of the state the response reflects.
    pub last_index: u64,
}

/// Monotonic cursor over orchestrator indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexCursor {
    index: u64,
}

impl IndexCursor {
    /// A cursor that has not observed any state yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current index (zero before the first successful query).
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Move the cursor to `last_index`. Returns true if it moved forward.
    ///
    /// An index lower than the current one is ignored so consumers never
    /// observe the cursor going backwards.
    pub fn advance(&mut self, last_index: u64) -> bool {
        if last_index > self.index {
            self.index = last_index;
            true
        } else {
            if last_index < self.index {
                warn!(
                    current = self.index,
                    received = last_index,
                    "orchestrator index went backwards; keeping cursor"
                );
            }
            false
        }
    }

    /// Query options for the next blocking request from this cursor.
    pub fn query(&self, wait_time: Option<Duration>) -> QueryOptions {
        QueryOptions::blocking(self.index, wait_time)
    }
}

/// Pause taken between a failed blocking query and the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Retry straight away, only yielding to the scheduler.
    #[default]
    Immediate,
    /// Double the pause on every consecutive failure, starting at `base`
    /// and capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl RetryPolicy {
    /// Pause before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            RetryPolicy::Immediate => Duration::ZERO,
            RetryPolicy::Exponential { base, max } => {
                let shift = attempt.saturating_sub(1).min(31);
                base.saturating_mul(1u32 << shift).min(max)
            }
        }
    }

    /// Wait out the pause for retry number `attempt`.
    pub async fn wait(&self, attempt: u32) {
        let delay = self.delay(attempt);
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Resolve once `shutdown` holds `true` or its sender is dropped.
///
/// Other values sent on the channel are ignored.
pub async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
