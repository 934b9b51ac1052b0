//! Resumable chunk upload scheduling.
//!
//! This crate drives one upload session at a time: it computes the pending
//! set from the session's chunk table, dispatches chunks in batches of at
//! most `max_parallel` concurrent transfers, records every outcome in the
//! session store and retries failures up to `max_retries` times.
//!
//! # Lifecycle
//!
//! 1. **Bind** a data source validated against the session's name and size
//! 2. **Start** the dispatch loop (also the resume path after a restart)
//! 3. **Pause** or **cancel**; in-flight chunks always settle
//! 4. **Retry** chunks left failed after the automatic retry pass

mod dispatch;
pub mod error;
pub mod scheduler;
pub mod types;

// Re-export primary types for convenience.
pub use error::SchedulerError;
pub use scheduler::UploadScheduler;
pub use types::{SchedulerConfig, SchedulerEvent};
