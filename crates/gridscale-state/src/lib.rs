//! gridscale-state — the autoscaler's in-memory view of job scale status.
//!
//! Every job referenced by a policy gets one background watcher that
//! long-polls the orchestrator for the job's scale status. Watchers are
//! started on demand, shared between concurrent callers and torn down when
//! the job stops. Nothing is persisted: all state is rebuilt from the
//! orchestrator on restart.
//!
//! # Architecture
//!
//! ```text
//! JobStatusHandler
//!   ├── WatcherRegistry   job_id → WatcherSlot { shutdown, ready, task }
//!   │     └── JobStatusWatcher (one task per job, blocking queries)
//!   │           └── StatusCallback ──▶ JobStatusHandler::on_update
//!   ├── JobStatusStore    job_id → latest JobScaleStatus
//!   └── PolicyStore       policies held for each job
//! ```
//!
//! `ensure_watcher` returns only after the job's watcher has processed its
//! first successful query, so code past it always sees a current status.
//! A stopped job removes its policies, its watcher and its status.

pub mod config;
pub mod error;
pub mod handler;
pub mod policies;
pub mod registry;
pub mod status;
pub mod watcher;

pub use config::SyncConfig;
pub use error::{StateError, StateResult};
pub use handler::JobStatusHandler;
pub use policies::{PolicyCache, PolicyStore};
pub use registry::WatcherRegistry;
pub use status::JobStatusStore;
pub use watcher::{status_callback, BoxFuture, ErrorCallback, JobStatusWatcher, StatusCallback};
