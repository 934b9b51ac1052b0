//! Public control surface of one upload session.

use std::sync::{Arc, PoisonError};

use chunkwise_protocol::{Session, SpeedTier, UploadProgress, UploadStatus};
use chunkwise_session_store::{SessionStore, is_consistent};
use chunkwise_transfer::{DataSource, TransferClient, validate_source};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dispatch::{Shared, run_loop};
use crate::error::SchedulerError;
use crate::types::{SchedulerConfig, SchedulerEvent};

/// Drives the chunk transfers of one session.
///
/// At most one dispatch loop is active at a time; calling [`start`] while
/// running is a no-op. Chunk-status transitions are written to the session
/// store off the async workers, in the order they were applied.
///
/// [`start`]: UploadScheduler::start
pub struct UploadScheduler {
    inner: Arc<Shared>,
    events_rx: Option<mpsc::Receiver<SchedulerEvent>>,
}

impl UploadScheduler {
    /// Creates a scheduler for `session` and persists the session once.
    pub fn new(
        session: Session,
        client: Arc<dyn TransferClient>,
        store: Arc<dyn SessionStore>,
        config: SchedulerConfig,
    ) -> Self {
        store.save(&session);
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            inner: Arc::new(Shared::new(session, client, store, config, events_tx)),
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SchedulerEvent>> {
        self.events_rx.take()
    }

    pub fn session_id(&self) -> String {
        self.inner.session_id()
    }

    /// Current snapshot of the session and its chunk table.
    pub fn session(&self) -> Session {
        self.inner.snapshot()
    }

    // -----------------------------------------------------------------------
    // Data source binding
    // -----------------------------------------------------------------------

    /// Binds a byte source after checking its name and size against the
    /// session. A rejected source leaves the current binding untouched.
    pub fn bind_source(&self, source: Arc<dyn DataSource>) -> Result<(), SchedulerError> {
        let session = self.inner.snapshot();
        validate_source(&session, source.as_ref()).map_err(SchedulerError::SourceMismatch)?;
        info!(session = %session.id, name = source.name(), size = source.size(), "data source bound");
        self.inner.set_source(Some(source));
        Ok(())
    }

    pub fn unbind_source(&self) {
        self.inner.set_source(None);
    }

    /// Returns `true` if chunks remain to be sent but no source is bound.
    pub fn needs_data_source(&self) -> bool {
        self.inner.source().is_none() && self.inner.snapshot().has_outstanding_work()
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    /// Starts the dispatch loop, or un-pauses the active one.
    ///
    /// Fresh start, resume after pause and resume after a restart all take
    /// this path: the pending set is recomputed from the chunk table and
    /// includes failed chunks, also those past the retry ceiling.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let session = self.inner.snapshot();
        if !is_consistent(&session) {
            warn!(session = %session.id, "chunk table does not match the file, refusing to start");
            return Err(SchedulerError::InconsistentSession(session.id));
        }
        let has_source = self.inner.source().is_some();

        let generation = {
            let mut control = self.inner.lock_control();
            if control.running {
                if control.paused {
                    control.paused = false;
                    info!(session = %session.id, "pause withdrawn, loop continues");
                }
                return Ok(());
            }
            if session.has_outstanding_work() && !has_source {
                drop(control);
                warn!(session = %session.id, "cannot start without a data source");
                self.inner.emit(SchedulerEvent::NeedsDataSource {
                    session_id: session.id.clone(),
                });
                return Err(SchedulerError::NeedsDataSource(session.id));
            }
            control.running = true;
            control.paused = false;
            control.generation += 1;
            control.generation
        };

        let handle = tokio::spawn(run_loop(Arc::clone(&self.inner), generation));
        *self
            .inner
            .loop_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Alias of [`start`](Self::start).
    pub fn resume(&self) -> Result<(), SchedulerError> {
        self.start()
    }

    /// Stops new batches from being dispatched. In-flight transfers finish.
    pub fn pause(&self) {
        let paused = {
            let mut control = self.inner.lock_control();
            if control.running && !control.paused {
                control.paused = true;
                true
            } else {
                false
            }
        };
        if paused {
            let session_id = self.inner.session_id();
            info!(session = %session_id, "pause requested");
            self.inner.emit(SchedulerEvent::Paused { session_id });
        }
    }

    /// Pauses and reports not-running immediately.
    ///
    /// In-flight transfers still settle and are recorded; no chunk is
    /// marked failed because of the cancel.
    pub fn cancel(&self) {
        {
            let mut control = self.inner.lock_control();
            control.paused = true;
            control.running = false;
            control.generation += 1;
        }
        let session_id = self.inner.session_id();
        info!(session = %session_id, "upload cancelled");
        self.inner.emit(SchedulerEvent::Cancelled { session_id });
    }

    /// Clears and re-sends every failed chunk under the retry ceiling.
    ///
    /// Runs independently of the dispatch loop but shares its in-flight
    /// bound. Returns the retried indices. Chunks at the ceiling stay failed
    /// until the next [`start`](Self::start).
    pub async fn retry_failed_chunks(&self) -> Result<Vec<u32>, SchedulerError> {
        let candidates = self.inner.retry_candidates();
        if candidates.is_empty() {
            return Ok(candidates);
        }
        if self.inner.source().is_none() {
            let session_id = self.inner.session_id();
            self.inner.emit(SchedulerEvent::NeedsDataSource {
                session_id: session_id.clone(),
            });
            return Err(SchedulerError::NeedsDataSource(session_id));
        }

        info!(session = %self.inner.session_id(), chunks = ?candidates, "manual retry");
        self.inner.retry_pass(&candidates).await;

        let session = self.inner.snapshot();
        if session.is_complete() {
            self.inner.notify_completed();
        } else if !self.is_running() {
            let failed = session.failed_chunks();
            if !failed.is_empty() {
                self.inner.report_stalled(failed);
            }
        }
        Ok(candidates)
    }

    /// Waits for the most recently started dispatch loop to exit.
    pub async fn wait(&self) {
        let handle = self
            .inner
            .loop_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "dispatch loop task failed");
            }
        }
    }

    /// Cancels the upload and removes the session from the store.
    pub async fn delete(self) -> Result<(), SchedulerError> {
        self.cancel();
        self.wait().await;
        let session_id = self.inner.session_id();
        self.inner.store.delete(&session_id)?;
        info!(session = %session_id, "session deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Speed tier
    // -----------------------------------------------------------------------

    /// Changes the tier used by chunks dispatched from now on.
    pub fn set_speed_tier(&self, tier: SpeedTier) {
        self.inner.set_speed_tier(tier);
        info!(session = %self.inner.session_id(), %tier, "speed tier changed");
    }

    pub fn speed_tier(&self) -> SpeedTier {
        self.inner.speed_tier()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.inner.lock_control().running
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock_control().paused
    }

    pub fn status(&self) -> UploadStatus {
        let session = self.inner.snapshot();
        self.status_of(&session)
    }

    fn status_of(&self, session: &Session) -> UploadStatus {
        if session.is_complete() {
            return UploadStatus::Completed;
        }
        let (running, paused) = {
            let control = self.inner.lock_control();
            (control.running, control.paused)
        };
        if paused {
            UploadStatus::Paused
        } else if running {
            UploadStatus::Running
        } else if self.inner.source().is_none() {
            UploadStatus::NeedsDataSource
        } else if !session.failed_chunks().is_empty() {
            UploadStatus::Stalled
        } else {
            UploadStatus::Idle
        }
    }

    pub fn progress_percent(&self) -> f64 {
        self.inner.snapshot().progress_percent()
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.inner.snapshot().uploaded_bytes()
    }

    pub fn failed_chunk_list(&self) -> Vec<u32> {
        self.inner.snapshot().failed_chunks()
    }

    /// Aggregate progress for display.
    pub fn progress(&self) -> UploadProgress {
        let session = self.inner.snapshot();
        let status = self.status_of(&session);
        let uploaded_bytes = session.uploaded_bytes();
        let eta_secs = if session.is_complete() {
            None
        } else {
            self.inner
                .speed
                .eta(session.file_size.saturating_sub(uploaded_bytes))
                .map(|d| d.as_secs_f64())
        };

        UploadProgress {
            status,
            total_chunks: session.total_chunks,
            uploaded_chunks: session.uploaded_count(),
            failed_chunks: session.failed_chunks(),
            progress_percent: session.progress_percent(),
            total_bytes: session.file_size,
            uploaded_bytes,
            speed_tier: self.inner.speed_tier(),
            bytes_per_second: self.inner.speed.bytes_per_second(),
            eta_secs,
            session_id: session.id,
            file_name: session.file_name,
        }
    }
}
