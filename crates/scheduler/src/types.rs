//! Configuration and event types for the scheduler.

use std::time::Duration;

use chunkwise_protocol::{DEFAULT_BATCH_DELAY, MAX_PARALLEL, MAX_RETRIES, SpeedTier};

/// Tunables of one scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum chunk transfers in flight, shared by the loop and retry passes.
    pub max_parallel: usize,
    /// Failures after which a chunk is skipped by retry passes.
    pub max_retries: u32,
    /// Pacing delay between batches.
    pub batch_delay: Duration,
    /// Delay between the last settled chunk and the completion notification.
    pub completion_delay: Duration,
    /// Speed tier used for the first dispatched chunks.
    pub speed_tier: SpeedTier,
    /// Ask the transfer client for chunks it already holds before dispatching.
    pub reconcile_remote: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel: MAX_PARALLEL,
            max_retries: MAX_RETRIES,
            batch_delay: DEFAULT_BATCH_DELAY,
            completion_delay: Duration::ZERO,
            speed_tier: SpeedTier::default(),
            reconcile_remote: true,
        }
    }
}

/// Event emitted while a session is being uploaded.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// A chunk was accepted by the transfer client.
    ChunkUploaded {
        session_id: String,
        index: u32,
        uploaded: u32,
        total: u32,
    },
    /// A chunk transfer failed and was recorded for retry.
    ChunkFailed {
        session_id: String,
        index: u32,
        retry_count: u32,
        error: String,
    },
    /// A pause was requested.
    Paused { session_id: String },
    /// The upload was cancelled; the chunk table is kept as-is.
    Cancelled { session_id: String },
    /// Dispatch is blocked until a validated source is bound.
    NeedsDataSource { session_id: String },
    /// Every chunk is uploaded. Sent at most once per scheduler.
    Completed { session_id: String },
    /// The pass ended with failed chunks that need an explicit retry.
    Stalled { session_id: String, failed: Vec<u32> },
}

/// Loop control flags, guarded together so transitions are atomic.
#[derive(Debug, Default)]
pub(crate) struct Control {
    pub(crate) running: bool,
    pub(crate) paused: bool,
    /// Bumped on every loop start and on cancel; a loop whose generation
    /// is stale exits at its next boundary without touching the flags.
    pub(crate) generation: u64,
}
