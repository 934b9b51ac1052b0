//! Chunk partitioning, data sources and the transfer client seam.
//!
//! The partitioner is pure and restartable: a source is re-bound on every
//! resume, so the same `(length, chunk_size)` must always yield the same
//! ranges. Bytes are only read at dispatch time; nothing here persists them.

mod chunked;
mod client;
mod progress;
mod source;
mod types;
mod validation;

pub use chunked::{checksum_bytes, chunk_count, chunk_range, partition};
pub use client::{SimulatedClient, TransferClient};
pub use progress::SpeedCalculator;
pub use source::{DataSource, FileSource, MemorySource};
pub use types::{ChunkRange, ChunkTransfer};
pub use validation::validate_source;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(u64),

    #[error("range {start}..{end} is outside a source of {size} bytes")]
    OutOfRange { start: u64, end: u64, size: u64 },

    #[error(
        "source mismatch: expected {expected_name} ({expected_size} bytes), \
         got {actual_name} ({actual_size} bytes)"
    )]
    SourceMismatch {
        expected_name: String,
        expected_size: u64,
        actual_name: String,
        actual_size: u64,
    },

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("transfer rejected: {0}")]
    Rejected(String),
}
