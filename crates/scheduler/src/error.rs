//! Scheduler error types.

use chunkwise_session_store::{SessionError, StoreError};
use chunkwise_transfer::TransferError;

/// Errors surfaced by the scheduler's control surface.
///
/// Chunk transfer failures never show up here: they are absorbed into the
/// chunk table and retried.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("session {0} has pending chunks but no data source is bound")]
    NeedsDataSource(String),

    #[error("session {0} has a chunk table that does not match its file size")]
    InconsistentSession(String),

    #[error("data source rejected: {0}")]
    SourceMismatch(#[source] TransferError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
