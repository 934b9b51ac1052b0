//! Session construction and the non-destructive chunk-table update.

use chrono::Utc;
use chunkwise_protocol::{ChunkRecord, Session};
use tracing::debug;

use crate::SessionError;

/// Transition applied to one chunk record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Transfer succeeded: `uploaded = true`, `failed = false`.
    Uploaded,
    /// Transfer failed: `failed = true`, `retry_count + 1`.
    Failed,
    /// Retry requested: `failed = false`, `retry_count` untouched.
    Cleared,
}

/// Generates a new client-side session id (UUID v4).
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Creates a session with every chunk not uploaded, not failed, zero retries.
pub fn create_session(
    id: impl Into<String>,
    file_name: impl Into<String>,
    file_size: u64,
    total_chunks: u32,
    chunk_size: u64,
) -> Session {
    let now = Utc::now();
    Session {
        id: id.into(),
        file_name: file_name.into(),
        file_size,
        total_chunks,
        chunk_size,
        chunks: (0..total_chunks).map(ChunkRecord::new).collect(),
        created_at: now,
        last_update: now,
    }
}

/// Creates a session with a fresh id and a chunk count derived from the
/// partitioner rules.
pub fn session_for_file(
    file_name: impl Into<String>,
    file_size: u64,
    chunk_size: u64,
) -> Result<Session, SessionError> {
    let total_chunks = chunkwise_transfer::chunk_count(file_size, chunk_size)?;
    Ok(create_session(
        new_session_id(),
        file_name,
        file_size,
        total_chunks,
        chunk_size,
    ))
}

/// Returns a new snapshot with only chunk `index` transitioned.
///
/// The input is never mutated. `last_update` is refreshed on every applied
/// transition. Uploaded is terminal: a late `Failed` or `Cleared` for an
/// uploaded chunk leaves the table as it is.
pub fn apply_chunk_outcome(
    session: &Session,
    index: u32,
    outcome: ChunkOutcome,
) -> Result<Session, SessionError> {
    let Some(current) = session.chunks.get(index as usize) else {
        return Err(SessionError::ChunkOutOfRange {
            index,
            total: session.total_chunks,
        });
    };

    let mut next = session.clone();
    if current.uploaded && outcome != ChunkOutcome::Uploaded {
        debug!(session = %session.id, chunk = index, ?outcome, "ignoring outcome for uploaded chunk");
        return Ok(next);
    }

    let record = &mut next.chunks[index as usize];
    match outcome {
        ChunkOutcome::Uploaded => {
            record.uploaded = true;
            record.failed = false;
        }
        ChunkOutcome::Failed => {
            record.failed = true;
            record.retry_count += 1;
        }
        ChunkOutcome::Cleared => {
            record.failed = false;
        }
    }
    next.last_update = Utc::now();
    Ok(next)
}

/// Checks the chunk-table invariants of a loaded snapshot.
///
/// `total_chunks` must be the partition count of `file_size`, the table must
/// have exactly that many records indexed by position, and no record may be
/// both uploaded and failed.
pub fn is_consistent(session: &Session) -> bool {
    session.total_chunks > 0
        && chunkwise_transfer::chunk_count(session.file_size, session.chunk_size)
            .is_ok_and(|count| count == session.total_chunks)
        && session.chunks.len() == session.total_chunks as usize
        && session
            .chunks
            .iter()
            .enumerate()
            .all(|(i, c)| c.index as usize == i && !(c.uploaded && c.failed))
}
