//! Shared data model for chunkwise resumable uploads.
//!
//! Everything here is plain data: the persisted [`Session`] with its chunk
//! table, the speed tiers of the simulated transport, and the progress
//! snapshot handed to the presentation layer.

pub mod constants;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{
    DEFAULT_BATCH_DELAY, DEFAULT_CHUNK_SIZE, DEFAULT_FAILURE_RATE, MAX_PARALLEL, MAX_RETRIES,
};
pub use types::{
    ChunkRecord, ParseSpeedTierError, Session, SpeedTier, UploadProgress, UploadStatus,
};
