use chunkwise_protocol::Session;
use tracing::warn;

use crate::StoreError;

/// Durable key-value persistence of session snapshots, keyed by session id.
pub trait SessionStore: Send + Sync {
    /// Persists the full snapshot, replacing any previous one for its id.
    fn try_save(&self, session: &Session) -> Result<(), StoreError>;

    /// Best-effort save: a failure is logged and swallowed.
    ///
    /// The next successful save carries all accumulated state, so a single
    /// failed write loses nothing unless the process dies before then.
    fn save(&self, session: &Session) {
        if let Err(e) = self.try_save(session) {
            warn!(session = %session.id, error = %e, "failed to persist session snapshot");
        }
    }

    /// Returns the last saved snapshot, or `None` if absent or unreadable.
    fn load(&self, id: &str) -> Option<Session>;

    /// Returns every readable session, oldest first.
    fn list_all(&self) -> Vec<Session>;

    /// Removes a session. Deleting an unknown id is a no-op.
    fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Rejects ids that could escape the store's namespace.
pub(crate) fn validate_session_id(id: &str) -> Result<(), StoreError> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0'])
        || id.starts_with('.');
    if bad {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}
