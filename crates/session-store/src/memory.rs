//! In-memory backend holding serialized snapshots.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chunkwise_protocol::Session;
use tracing::warn;

use crate::StoreError;
use crate::session::is_consistent;
use crate::store::{SessionStore, validate_session_id};

/// Keeps each session as its JSON payload, the same shape the file store
/// writes, so parsing and corruption behave identically.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a raw payload under `id`, bypassing serialization.
    pub fn insert_raw(&self, id: impl Into<String>, payload: impl Into<String>) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into(), payload.into());
    }

    /// Number of stored records, readable or not.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn parse(id: &str, payload: &str) -> Option<Session> {
        match serde_json::from_str::<Session>(payload) {
            Ok(session) if is_consistent(&session) => Some(session),
            Ok(_) => {
                warn!(session = %id, "inconsistent session record, treating as absent");
                None
            }
            Err(e) => {
                warn!(session = %id, error = %e, "corrupt session record, treating as absent");
                None
            }
        }
    }
}

impl SessionStore for MemoryStore {
    fn try_save(&self, session: &Session) -> Result<(), StoreError> {
        validate_session_id(&session.id)?;
        let json = serde_json::to_string(session)?;
        self.insert_raw(session.id.clone(), json);
        Ok(())
    }

    fn load(&self, id: &str) -> Option<Session> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(id).and_then(|payload| Self::parse(id, payload))
    }

    fn list_all(&self) -> Vec<Session> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut sessions: Vec<Session> = records
            .iter()
            .filter_map(|(id, payload)| Self::parse(id, payload))
            .collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }
}
