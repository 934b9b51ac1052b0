//! Shared scheduler state and the dispatch loop.
//!
//! The loop is cooperative: it suspends only while a batch settles and
//! during the pacing delay, and samples pause/cancel at iteration
//! boundaries. In-flight transfers always run to completion.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chunkwise_protocol::{Session, SpeedTier};
use chunkwise_session_store::{ChunkOutcome, SessionStore, apply_chunk_outcome};
use chunkwise_transfer::{
    ChunkTransfer, DataSource, SpeedCalculator, TransferClient, checksum_bytes, chunk_range,
};
use futures_util::future::join_all;
use tokio::sync::{Mutex as AsyncMutex, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::types::{Control, SchedulerConfig, SchedulerEvent};

/// State shared between the control surface, the loop and retry passes.
pub(crate) struct Shared {
    session: Mutex<Session>,
    /// Bumped under the session lock for every applied outcome.
    revision: AtomicU64,
    /// Highest revision handed to the store.
    persisted: AsyncMutex<u64>,
    source: RwLock<Option<Arc<dyn DataSource>>>,
    client: Arc<dyn TransferClient>,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) config: SchedulerConfig,
    speed_tier: RwLock<SpeedTier>,
    control: Mutex<Control>,
    permits: Semaphore,
    in_flight: Mutex<HashSet<u32>>,
    completion_sent: AtomicBool,
    pub(crate) speed: SpeedCalculator,
    events_tx: mpsc::Sender<SchedulerEvent>,
    pub(crate) loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    pub(crate) fn new(
        session: Session,
        client: Arc<dyn TransferClient>,
        store: Arc<dyn SessionStore>,
        config: SchedulerConfig,
        events_tx: mpsc::Sender<SchedulerEvent>,
    ) -> Self {
        let speed_tier = config.speed_tier;
        let permits = Semaphore::new(config.max_parallel.max(1));
        Self {
            session: Mutex::new(session),
            revision: AtomicU64::new(0),
            persisted: AsyncMutex::new(0),
            source: RwLock::new(None),
            client,
            store,
            config,
            speed_tier: RwLock::new(speed_tier),
            control: Mutex::new(Control::default()),
            permits,
            in_flight: Mutex::new(HashSet::new()),
            completion_sent: AtomicBool::new(false),
            speed: SpeedCalculator::default(),
            events_tx,
            loop_handle: Mutex::new(None),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn snapshot(&self) -> Session {
        self.lock_session().clone()
    }

    pub(crate) fn session_id(&self) -> String {
        self.lock_session().id.clone()
    }

    pub(crate) fn source(&self) -> Option<Arc<dyn DataSource>> {
        self.source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_source(&self, source: Option<Arc<dyn DataSource>>) {
        *self.source.write().unwrap_or_else(PoisonError::into_inner) = source;
    }

    pub(crate) fn speed_tier(&self) -> SpeedTier {
        *self.speed_tier.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_speed_tier(&self, tier: SpeedTier) {
        *self.speed_tier.write().unwrap_or_else(PoisonError::into_inner) = tier;
    }

    pub(crate) fn emit(&self, event: SchedulerEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            trace!("dropping scheduler event: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // Chunk table
    // -----------------------------------------------------------------------

    /// Applies one outcome and persists the new snapshot.
    ///
    /// Returns once the snapshot, or a newer one, has been written.
    async fn apply(&self, index: u32, outcome: ChunkOutcome) -> Option<Session> {
        let (next, revision) = {
            let mut session = self.lock_session();
            match apply_chunk_outcome(&session, index, outcome) {
                Ok(next) => {
                    *session = next.clone();
                    (next, self.revision.fetch_add(1, Ordering::SeqCst) + 1)
                }
                Err(e) => {
                    warn!(session = %session.id, error = %e, "cannot apply chunk outcome");
                    return None;
                }
            }
        };
        self.persist(next.clone(), revision).await;
        Some(next)
    }

    /// Writes `snapshot` on the blocking pool unless a newer revision is
    /// already on disk. Writes are serialized, so the store never sees an
    /// older table after a newer one.
    async fn persist(&self, snapshot: Session, revision: u64) {
        let mut persisted = self.persisted.lock().await;
        if *persisted >= revision {
            return;
        }
        let store = Arc::clone(&self.store);
        let session_id = snapshot.id.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
            warn!(session = %session_id, error = %e, "session write task failed");
        }
        *persisted = revision;
    }

    /// Failed chunks still under the retry ceiling.
    pub(crate) fn retry_candidates(&self) -> Vec<u32> {
        let max_retries = self.config.max_retries;
        self.lock_session()
            .chunks
            .iter()
            .filter(|c| c.failed && c.retry_count < max_retries)
            .map(|c| c.index)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Loop control
    // -----------------------------------------------------------------------

    /// Checks whether the loop of `generation` may go on.
    ///
    /// Observing a pause clears `running` in the same critical section, so a
    /// concurrent `start()` either un-pauses this loop or spawns a new one.
    fn should_continue(&self, generation: u64) -> bool {
        let mut control = self.lock_control();
        if control.generation != generation {
            return false;
        }
        if control.paused {
            control.running = false;
            return false;
        }
        true
    }

    fn finish_run(&self, generation: u64) {
        let mut control = self.lock_control();
        if control.generation == generation {
            control.running = false;
        }
    }

    pub(crate) fn notify_completed(&self) {
        if !self.completion_sent.swap(true, Ordering::SeqCst) {
            let session_id = self.session_id();
            info!(session = %session_id, "upload completed");
            self.emit(SchedulerEvent::Completed { session_id });
        }
    }

    pub(crate) fn report_stalled(&self, failed: Vec<u32>) {
        let session_id = self.session_id();
        warn!(session = %session_id, failed = ?failed, "upload stalled, explicit retry required");
        self.emit(SchedulerEvent::Stalled { session_id, failed });
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Marks chunks the remote side already holds as uploaded.
    async fn reconcile_remote(&self) {
        let session_id = self.session_id();
        match self.client.list_remote_chunks(&session_id).await {
            Ok(remote) if remote.is_empty() => {}
            Ok(remote) => {
                let mut adopted = 0;
                for index in remote {
                    let known = self.lock_session().chunk(index).map(|c| c.uploaded);
                    if known == Some(false)
                        && self.apply(index, ChunkOutcome::Uploaded).await.is_some()
                    {
                        adopted += 1;
                    }
                }
                info!(session = %session_id, adopted, "reconciled chunks held remotely");
            }
            Err(e) => {
                warn!(session = %session_id, error = %e, "remote chunk listing failed, using local state");
            }
        }
    }

    /// Dispatches `batch` concurrently and waits for every chunk to settle.
    async fn dispatch_batch(&self, batch: &[u32]) {
        join_all(batch.iter().map(|&index| self.dispatch_chunk(index))).await;
    }

    /// Reads, transfers and records the outcome of one chunk.
    ///
    /// A chunk already in flight on another path is skipped, so a loop
    /// started right after a cancel never doubles up on the old loop's batch.
    async fn dispatch_chunk(&self, index: u32) {
        let Some(_claim) = InFlight::claim(&self.in_flight, index) else {
            trace!(chunk = index, "chunk already in flight");
            return;
        };
        let Ok(_permit) = self.permits.acquire().await else {
            return;
        };
        let Some(source) = self.source() else {
            debug!(chunk = index, "no data source bound, chunk not dispatched");
            return;
        };

        let (session_id, total_chunks, file_size, chunk_size, uploaded) = {
            let s = self.lock_session();
            let uploaded = s.chunk(index).is_some_and(|c| c.uploaded);
            (s.id.clone(), s.total_chunks, s.file_size, s.chunk_size, uploaded)
        };
        if uploaded {
            return;
        }

        let range = match chunk_range(file_size, chunk_size, index) {
            Ok(Some(range)) => range,
            Ok(None) => {
                self.record_failure(index, "chunk index past end of file".to_string())
                    .await;
                return;
            }
            Err(e) => {
                self.record_failure(index, format!("cannot compute chunk range: {e}"))
                    .await;
                return;
            }
        };

        let read = tokio::task::spawn_blocking(move || source.read_range(&range)).await;
        let data = match read {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                self.record_failure(index, e.to_string()).await;
                return;
            }
            Err(e) => {
                self.record_failure(index, format!("read task failed: {e}")).await;
                return;
            }
        };

        let bytes = data.len() as u64;
        let speed_tier = self.speed_tier();
        debug!(session = %session_id, chunk = index, bytes, %speed_tier, "dispatching chunk");
        let request = ChunkTransfer {
            session_id,
            chunk_index: index,
            total_chunks,
            checksum: checksum_bytes(&data),
            data,
            speed_tier,
        };

        match self.client.transfer(request).await {
            Ok(()) => self.record_success(index, bytes).await,
            Err(e) => self.record_failure(index, e.to_string()).await,
        }
    }

    async fn record_success(&self, index: u32, bytes: u64) {
        let Some(session) = self.apply(index, ChunkOutcome::Uploaded).await else {
            return;
        };
        self.speed.record(bytes);
        let uploaded = session.uploaded_count();
        self.emit(SchedulerEvent::ChunkUploaded {
            session_id: session.id,
            index,
            uploaded,
            total: session.total_chunks,
        });
    }

    async fn record_failure(&self, index: u32, error: String) {
        let Some(session) = self.apply(index, ChunkOutcome::Failed).await else {
            return;
        };
        let retry_count = session.chunk(index).map_or(0, |c| c.retry_count);
        warn!(session = %session.id, chunk = index, retry_count, error = %error, "chunk transfer failed");
        self.emit(SchedulerEvent::ChunkFailed {
            session_id: session.id,
            index,
            retry_count,
            error,
        });
    }

    /// Clears the failed flag of `indices` and re-dispatches them together.
    pub(crate) async fn retry_pass(&self, indices: &[u32]) {
        for &index in indices {
            self.apply(index, ChunkOutcome::Cleared).await;
        }
        self.dispatch_batch(indices).await;
    }
}

/// Membership of one chunk index in the in-flight set, released on drop.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<u32>>,
    index: u32,
}

impl<'a> InFlight<'a> {
    fn claim(set: &'a Mutex<HashSet<u32>>, index: u32) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index);
        inserted.then_some(Self { set, index })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.index);
    }
}

/// The dispatch loop of one scheduler run.
pub(crate) async fn run_loop(shared: Arc<Shared>, generation: u64) {
    let session_id = shared.session_id();
    info!(session = %session_id, generation, "dispatch loop started");

    if shared.config.reconcile_remote {
        shared.reconcile_remote().await;
    }

    // Every chunk not yet uploaded gets one attempt per run, whatever its
    // retry count. Chunks that fail during this run wait for the retry pass.
    let mut failed_this_run: HashSet<u32> = HashSet::new();
    loop {
        let pending: Vec<u32> = shared
            .snapshot()
            .pending_chunks()
            .into_iter()
            .filter(|index| !failed_this_run.contains(index))
            .collect();
        if pending.is_empty() {
            break;
        }
        if !shared.should_continue(generation) {
            info!(session = %session_id, "dispatch loop stopped");
            return;
        }
        if shared.source().is_none() {
            shared.finish_run(generation);
            warn!(session = %session_id, "data source missing, dispatch blocked");
            shared.emit(SchedulerEvent::NeedsDataSource {
                session_id: session_id.clone(),
            });
            return;
        }

        let batch: Vec<u32> = pending
            .into_iter()
            .take(shared.config.max_parallel.max(1))
            .collect();
        debug!(session = %session_id, batch = ?batch, "dispatching batch");
        shared.dispatch_batch(&batch).await;
        {
            let session = shared.snapshot();
            failed_this_run.extend(
                batch
                    .iter()
                    .copied()
                    .filter(|&index| session.chunk(index).is_some_and(|c| c.failed)),
            );
        }

        if !shared.should_continue(generation) {
            info!(session = %session_id, "dispatch loop stopped after batch");
            return;
        }
        if shared.snapshot().is_complete() {
            break;
        }
        tokio::time::sleep(shared.config.batch_delay).await;
    }

    // Main pass drained: give failures of this run one more chance.
    let candidates = shared.retry_candidates();
    if !candidates.is_empty() && shared.source().is_some() {
        info!(session = %session_id, chunks = ?candidates, "retrying failed chunks");
        shared.retry_pass(&candidates).await;
    }

    if !shared.config.completion_delay.is_zero() {
        tokio::time::sleep(shared.config.completion_delay).await;
    }
    shared.finish_run(generation);

    let session = shared.snapshot();
    if session.is_complete() {
        shared.notify_completed();
    } else {
        let failed = session.failed_chunks();
        if !failed.is_empty() {
            shared.report_stalled(failed);
        }
    }
}
