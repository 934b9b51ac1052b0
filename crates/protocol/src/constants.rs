use std::time::Duration;

/// Maximum number of recorded failures after which a chunk is no longer
/// picked up by a retry pass.
pub const MAX_RETRIES: u32 = 3;

/// Maximum number of chunk transfers in flight for one session.
pub const MAX_PARALLEL: usize = 5;

/// Default chunk size (1 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Pause between two dispatch batches.
///
/// Pacing only: nothing relies on its exact duration.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Independent failure probability of the simulated transfer client.
pub const DEFAULT_FAILURE_RATE: f64 = 0.10;
