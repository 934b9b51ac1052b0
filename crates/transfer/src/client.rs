use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chunkwise_protocol::DEFAULT_FAILURE_RATE;
use rand::Rng;
use tracing::{debug, trace};

use crate::TransferError;
use crate::chunked::checksum_bytes;
use crate::types::ChunkTransfer;

/// Moves one chunk's bytes to the remote endpoint.
///
/// Implementations must be safe to call concurrently for distinct chunk
/// indices of the same session. Per-chunk timeouts are the implementation's
/// concern; callers never abort an in-flight transfer.
pub trait TransferClient: Send + Sync {
    /// Transfers one chunk and reports success or failure.
    fn transfer(
        &self,
        chunk: ChunkTransfer,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + '_>>;

    /// Chunk indices the remote side already holds for `session_id`.
    ///
    /// Lets a backend report progress that local state lost. Returning an
    /// empty list makes local state the sole source of truth.
    fn list_remote_chunks<'a>(
        &'a self,
        session_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u32>, TransferError>> + Send + 'a>>;
}

/// Stand-in transport that sleeps and fails at random.
///
/// Latency is sampled uniformly from the window of the chunk's speed tier;
/// each call fails independently with probability `failure_rate`.
#[derive(Debug, Clone)]
pub struct SimulatedClient {
    failure_rate: f64,
}

impl Default for SimulatedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedClient {
    /// Creates a client with the default 10% failure rate.
    pub fn new() -> Self {
        Self {
            failure_rate: DEFAULT_FAILURE_RATE,
        }
    }

    /// Creates a client with a custom failure probability, clamped to `[0, 1]`.
    pub fn with_failure_rate(failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_finite() {
            failure_rate.clamp(0.0, 1.0)
        } else {
            DEFAULT_FAILURE_RATE
        };
        Self { failure_rate }
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }
}

impl TransferClient for SimulatedClient {
    fn transfer(
        &self,
        chunk: ChunkTransfer,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + '_>> {
        Box::pin(async move {
            if !chunk.checksum.is_empty() && checksum_bytes(&chunk.data) != chunk.checksum {
                return Err(TransferError::ChecksumMismatch);
            }

            let (min, max) = chunk.speed_tier.latency_ms();
            // ThreadRng is not Send: sample before the await point.
            let (delay_ms, fail) = {
                let mut rng = rand::thread_rng();
                (rng.gen_range(min..=max), rng.gen_bool(self.failure_rate))
            };
            trace!(
                session = %chunk.session_id,
                chunk = chunk.chunk_index,
                delay_ms,
                "simulating chunk transfer"
            );
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;

            if fail {
                return Err(TransferError::Rejected(format!(
                    "simulated network error on chunk {}",
                    chunk.chunk_index
                )));
            }

            debug!(
                session = %chunk.session_id,
                chunk = chunk.chunk_index,
                total = chunk.total_chunks,
                bytes = chunk.data.len(),
                "chunk accepted"
            );
            Ok(())
        })
    }

    fn list_remote_chunks<'a>(
        &'a self,
        _session_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u32>, TransferError>> + Send + 'a>> {
        Box::pin(async move { Ok(Vec::new()) })
    }
}
