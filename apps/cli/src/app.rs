//! Command handlers: wire store, client and scheduler together.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use chunkwise_protocol::Session;
use chunkwise_scheduler::{SchedulerConfig, SchedulerEvent, UploadScheduler};
use chunkwise_session_store::{JsonFileStore, SessionStore, default_store_dir, session_for_file};
use chunkwise_transfer::{DataSource, FileSource, SimulatedClient};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::Command;
use crate::config::Config;

/// Runs one command to completion.
pub async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    let store = open_store(&config)?;

    match command {
        Command::Upload { path } => {
            let source = open_source(&path)?;
            let session = session_for_file(source.name(), source.size(), config.chunk_size)?;
            tracing::info!(
                session = %session.id,
                file = %session.file_name,
                chunks = session.total_chunks,
                "session created"
            );
            upload(session, source, store, &config).await
        }
        Command::Resume { id, path } => {
            let session = load_session(store.as_ref(), &id)?;
            upload(session, open_source(&path)?, store, &config).await
        }
        Command::Retry { id, path } => {
            let session = load_session(store.as_ref(), &id)?;
            retry(session, open_source(&path)?, store, &config).await
        }
        Command::List => {
            list(store.as_ref());
            Ok(())
        }
        Command::Status { id } => {
            let session = load_session(store.as_ref(), &id)?;
            print_session(&session);
            Ok(())
        }
        Command::Delete { id } => {
            store.delete(&id)?;
            tracing::info!(session = %id, "session deleted");
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> anyhow::Result<Arc<dyn SessionStore>> {
    let dir = match &config.store_dir {
        Some(dir) => dir.clone(),
        None => default_store_dir().context("cannot determine the session directory")?,
    };
    tracing::debug!(dir = %dir.display(), "using session store");
    Ok(Arc::new(JsonFileStore::new(dir)))
}

fn open_source(path: &Path) -> anyhow::Result<FileSource> {
    FileSource::open(path).with_context(|| format!("cannot open {}", path.display()))
}

fn load_session(store: &dyn SessionStore, id: &str) -> anyhow::Result<Session> {
    store
        .load(id)
        .with_context(|| format!("no readable session with id {id}"))
}

fn scheduler_config(config: &Config) -> SchedulerConfig {
    SchedulerConfig {
        batch_delay: config.batch_delay(),
        speed_tier: config.speed_tier,
        ..SchedulerConfig::default()
    }
}

/// Builds a scheduler for `session` with `source` bound to it.
fn prepare(
    session: Session,
    source: FileSource,
    store: Arc<dyn SessionStore>,
    config: &Config,
) -> anyhow::Result<(UploadScheduler, mpsc::Receiver<SchedulerEvent>)> {
    let client = Arc::new(SimulatedClient::with_failure_rate(config.failure_rate));
    let mut scheduler = UploadScheduler::new(session, client, store, scheduler_config(config));
    let events = scheduler
        .take_events()
        .context("scheduler events already taken")?;

    scheduler
        .bind_source(Arc::new(source))
        .context("file does not match the session")?;
    Ok((scheduler, events))
}

async fn upload(
    session: Session,
    source: FileSource,
    store: Arc<dyn SessionStore>,
    config: &Config,
) -> anyhow::Result<()> {
    let (scheduler, events) = prepare(session, source, store, config)?;
    scheduler.start()?;
    drive(&scheduler, events).await;
    report(&scheduler)
}

async fn retry(
    session: Session,
    source: FileSource,
    store: Arc<dyn SessionStore>,
    config: &Config,
) -> anyhow::Result<()> {
    let (scheduler, _events) = prepare(session, source, store, config)?;
    let retried = scheduler.retry_failed_chunks().await?;
    if retried.is_empty() {
        tracing::info!("no failed chunks under the retry limit, resume re-sends the rest");
    } else {
        tracing::info!(chunks = ?retried, "retried failed chunks");
    }
    report(&scheduler)
}

/// Logs scheduler events until the loop settles or Ctrl-C is pressed.
///
/// Ctrl-C pauses: the in-flight batch settles and is persisted, so the
/// session can be picked up later with `resume`.
async fn drive(scheduler: &UploadScheduler, mut events: mpsc::Receiver<SchedulerEvent>) {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("interrupt received, pausing after the current batch");
                scheduler.pause();
                break;
            }
            event = events.recv() => match event {
                Some(SchedulerEvent::ChunkUploaded { index, uploaded, total, .. }) => {
                    let progress = scheduler.progress();
                    tracing::info!(
                        chunk = index,
                        "{uploaded}/{total} chunks ({:.1}%), {:.0} B/s{}",
                        progress.progress_percent,
                        progress.bytes_per_second,
                        progress
                            .eta_secs
                            .map(|s| format!(", eta {s:.0}s"))
                            .unwrap_or_default(),
                    );
                }
                Some(SchedulerEvent::ChunkFailed { index, retry_count, error, .. }) => {
                    tracing::warn!(chunk = index, retry_count, "chunk failed: {error}");
                }
                Some(SchedulerEvent::Completed { .. })
                | Some(SchedulerEvent::Stalled { .. })
                | Some(SchedulerEvent::NeedsDataSource { .. })
                | None => break,
                Some(_) => {}
            }
        }
    }
    cancel.cancel();
    scheduler.wait().await;
}

fn report(scheduler: &UploadScheduler) -> anyhow::Result<()> {
    let session = scheduler.session();
    print_session(&session);

    if session.is_complete() {
        return Ok(());
    }
    let failed = session.failed_chunks();
    if failed.is_empty() {
        println!("resume with: chunkwise resume {} <path>", session.id);
        Ok(())
    } else {
        // Resume re-sends every unfinished chunk, also those past the
        // retry limit that `retry` skips.
        bail!(
            "{} chunk(s) still failed, run: chunkwise resume {} <path>",
            failed.len(),
            session.id
        )
    }
}

fn list(store: &dyn SessionStore) {
    let sessions = store.list_all();
    if sessions.is_empty() {
        println!("no sessions");
        return;
    }
    for session in sessions {
        println!(
            "{}  {:<32} {:>5}/{:<5} {:>6.1}%{}",
            session.id,
            session.file_name,
            session.uploaded_count(),
            session.total_chunks,
            session.progress_percent(),
            if session.failed_chunks().is_empty() {
                String::new()
            } else {
                format!("  failed: {:?}", session.failed_chunks())
            }
        );
    }
}

fn print_session(session: &Session) {
    println!("session:  {}", session.id);
    println!("file:     {} ({} bytes)", session.file_name, session.file_size);
    println!(
        "chunks:   {}/{} uploaded, {} bytes each",
        session.uploaded_count(),
        session.total_chunks,
        session.chunk_size
    );
    println!("progress: {:.1}%", session.progress_percent());
    let failed = session.failed_chunks();
    if !failed.is_empty() {
        println!("failed:   {failed:?}");
    }
    println!("updated:  {}", session.last_update.to_rfc3339());
}
