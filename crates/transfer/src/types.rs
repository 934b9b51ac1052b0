use chunkwise_protocol::SpeedTier;

/// Half-open byte range `[start, end)` of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRange {
    /// 0-based chunk index.
    pub index: u32,
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    /// Length of the range in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns `true` for the single empty range of a zero-byte source.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// One chunk handed to a [`TransferClient`](crate::TransferClient).
#[derive(Debug, Clone)]
pub struct ChunkTransfer {
    pub session_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// SHA-256 hex checksum of `data` (empty means no verification).
    pub checksum: String,
    /// Speed tier sampled when the chunk was dispatched.
    pub speed_tier: SpeedTier,
}
