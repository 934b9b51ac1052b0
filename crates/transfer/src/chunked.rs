use sha2::{Digest, Sha256};

use crate::TransferError;
use crate::types::ChunkRange;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Partitioner
// ---------------------------------------------------------------------------

/// Number of chunks for a source of `len` bytes.
///
/// `ceil(len / chunk_size)`, except a zero-byte source has exactly one
/// empty chunk.
pub fn chunk_count(len: u64, chunk_size: u64) -> Result<u32, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize(chunk_size));
    }
    if len == 0 {
        return Ok(1);
    }
    u32::try_from(len.div_ceil(chunk_size)).map_err(|_| TransferError::InvalidChunkSize(chunk_size))
}

/// Byte range of chunk `index`, or `None` past the last chunk.
pub fn chunk_range(len: u64, chunk_size: u64, index: u32) -> Result<Option<ChunkRange>, TransferError> {
    let count = chunk_count(len, chunk_size)?;
    if index >= count {
        return Ok(None);
    }
    let start = index as u64 * chunk_size;
    let end = (start + chunk_size).min(len);
    Ok(Some(ChunkRange { index, start, end }))
}

/// Splits `len` bytes into ordered half-open ranges of `chunk_size` bytes.
///
/// The final range may be shorter. Pure: the same input always yields the
/// same ranges.
pub fn partition(len: u64, chunk_size: u64) -> Result<Vec<ChunkRange>, TransferError> {
    let count = chunk_count(len, chunk_size)?;
    let ranges = (0..count)
        .map(|index| {
            let start = index as u64 * chunk_size;
            ChunkRange {
                index,
                start,
                end: (start + chunk_size).min(len),
            }
        })
        .collect();
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_bytes_deterministic() {
        let c1 = checksum_bytes(b"hello world");
        let c2 = checksum_bytes(b"hello world");
        assert_eq!(c1, c2);
        assert_eq!(c1.len(), 64); // SHA-256 = 64 hex chars.
        assert_ne!(c1, checksum_bytes(b"hello"));
    }

    #[test]
    fn partition_exact_multiple() {
        let ranges = partition(12, 4).unwrap();
        assert_eq!(ranges.len(), 3);
        assert_eq!((ranges[0].start, ranges[0].end), (0, 4));
        assert_eq!((ranges[2].start, ranges[2].end), (8, 12));
    }

    #[test]
    fn partition_short_last_chunk() {
        let ranges = partition(10, 4).unwrap();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[2].index, 2);
        assert_eq!((ranges[2].start, ranges[2].end), (8, 10));
        assert_eq!(ranges[2].len(), 2);
    }

    #[test]
    fn partition_zero_length_has_one_empty_chunk() {
        let ranges = partition(0, 4).unwrap();
        assert_eq!(ranges.len(), 1);
        assert!(ranges[0].is_empty());
        assert_eq!(chunk_count(0, 4).unwrap(), 1);
    }

    #[test]
    fn partition_rejects_zero_chunk_size() {
        assert!(matches!(
            partition(10, 0),
            Err(TransferError::InvalidChunkSize(0))
        ));
    }

    #[test]
    fn partition_counts_and_covers() {
        for len in 0..64u64 {
            for chunk_size in 1..10u64 {
                let ranges = partition(len, chunk_size).unwrap();
                let expected = if len == 0 { 1 } else { len.div_ceil(chunk_size) };
                assert_eq!(ranges.len() as u64, expected, "len={len} c={chunk_size}");

                let total: u64 = ranges.iter().map(ChunkRange::len).sum();
                assert_eq!(total, len);

                // Contiguous, ascending, indexed by position.
                let mut next = 0;
                for (i, r) in ranges.iter().enumerate() {
                    assert_eq!(r.index as usize, i);
                    assert_eq!(r.start, next);
                    next = r.end;
                }
            }
        }
    }

    #[test]
    fn partition_is_idempotent() {
        let a = partition(1_000_003, 4096).unwrap();
        let b = partition(1_000_003, 4096).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn chunk_range_matches_partition() {
        let ranges = partition(10, 4).unwrap();
        for r in &ranges {
            assert_eq!(chunk_range(10, 4, r.index).unwrap(), Some(*r));
        }
        assert_eq!(chunk_range(10, 4, 3).unwrap(), None);
    }
}
