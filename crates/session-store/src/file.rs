//! JSON-file backend: one pretty-printed file per session.

use std::path::{Path, PathBuf};

use chunkwise_protocol::Session;
use tracing::{debug, warn};

use crate::StoreError;
use crate::session::is_consistent;
use crate::store::{SessionStore, validate_session_id};

const EXTENSION: &str = "json";

/// Stores each session as `<dir>/<id>.json`.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at [`default_store_dir`].
    pub fn open_default() -> Option<Self> {
        default_store_dir().map(Self::new)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        validate_session_id(id)?;
        Ok(self.dir.join(format!("{id}.{EXTENSION}")))
    }

    fn read_session(path: &Path) -> Option<Session> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read session file");
                return None;
            }
        };
        match serde_json::from_str::<Session>(&data) {
            Ok(session) if is_consistent(&session) => Some(session),
            Ok(_) => {
                warn!(path = %path.display(), "inconsistent session record, treating as absent");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt session record, treating as absent");
                None
            }
        }
    }

    /// Reads the record at `path`, which must be stored under its own id.
    fn read_named(path: &Path, id: &str) -> Option<Session> {
        let session = Self::read_session(path)?;
        if session.id != id {
            warn!(path = %path.display(), stored = %session.id, "session id does not match file name");
            return None;
        }
        Some(session)
    }
}

impl SessionStore for JsonFileStore {
    fn try_save(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.session_path(&session.id)?;
        let json = serde_json::to_string_pretty(session)?;
        std::fs::create_dir_all(&self.dir)?;

        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        debug!(session = %session.id, uploaded = session.uploaded_count(), "persisted session");
        Ok(())
    }

    fn load(&self, id: &str) -> Option<Session> {
        let path = match self.session_path(id) {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "refusing to load session");
                return None;
            }
        };
        Self::read_named(&path, id)
    }

    fn list_all(&self) -> Vec<Session> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "failed to list sessions");
                return Vec::new();
            }
        };

        let mut sessions: Vec<Session> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == EXTENSION))
            .filter_map(|path| {
                let id = path.file_stem()?.to_str()?.to_owned();
                Self::read_named(&path, &id)
            })
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self.session_path(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(session = %id, "deleted session");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Returns the default session directory.
pub fn default_store_dir() -> Option<PathBuf> {
    data_dir().map(|d| d.join("chunkwise").join("sessions"))
}

/// Returns the platform-specific data directory.
fn data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_DATA_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".local").join("share"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
    }
}
