//! Durable persistence of upload sessions.
//!
//! A session snapshot (identity, chunk table, timestamps) is rewritten in
//! full on every chunk-status transition. Chunk bytes are never stored, so
//! a resumed session needs its data source bound again.
//!
//! Reads are forgiving: a missing, unparseable or inconsistent record is
//! reported as absent and logged, never surfaced as an error.

mod file;
mod memory;
mod session;
mod store;

pub use file::{JsonFileStore, default_store_dir};
pub use memory::MemoryStore;
pub use session::{
    ChunkOutcome, apply_chunk_outcome, create_session, is_consistent, new_session_id,
    session_for_file,
};
pub use store::SessionStore;

/// Errors from the durable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid session id: {0:?}")]
    InvalidId(String),
}

/// Errors from session construction and chunk-table updates.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("chunk {index} out of range (session has {total} chunks)")]
    ChunkOutOfRange { index: u32, total: u32 },

    #[error("transfer error: {0}")]
    Transfer(#[from] chunkwise_transfer::TransferError),
}
