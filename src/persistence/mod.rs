// src/persistence/mod.rs

pub mod store;

use std::sync::Arc;

use crate::{
    error::AppError,
    models::{attempt::AttemptKey, snapshot::PersistedSnapshot},
};

pub use store::{FileStore, KeyValueStore, MemoryStore};

/// Snapshot persistence scoped to one `(examId, studentId)` pair.
///
/// Writes are fire-and-forget: a failed write is logged and the exam goes on.
#[derive(Clone)]
pub struct SessionPersistence {
    store: Arc<dyn KeyValueStore>,
    key: AttemptKey,
}

impl SessionPersistence {
    pub fn new(store: Arc<dyn KeyValueStore>, key: AttemptKey) -> Self {
        Self { store, key }
    }

    pub fn key(&self) -> AttemptKey {
        self.key
    }

    /// Reads the snapshot for this attempt, if any.
    ///
    /// A snapshot recorded for another attempt, or one that cannot be parsed, is ignored.
    pub fn load(&self) -> Option<PersistedSnapshot> {
        let raw = match self.store.get(&self.key.storage_key()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("Error loading saved data: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<PersistedSnapshot>(&raw) {
            Ok(snapshot) if snapshot.key == self.key => {
                tracing::info!(
                    "Restored snapshot for {}: {} answer(s), {}s left",
                    self.key,
                    snapshot.answers.len(),
                    snapshot.time_left_seconds
                );
                Some(snapshot)
            }
            Ok(snapshot) => {
                tracing::warn!(
                    "Ignoring snapshot for {} found under key of {}",
                    snapshot.key,
                    self.key
                );
                None
            }
            Err(e) => {
                tracing::error!("Discarding unreadable snapshot for {}: {}", self.key, e);
                None
            }
        }
    }

    pub fn save(&self, snapshot: &PersistedSnapshot) {
        if let Err(e) = self.try_save(snapshot) {
            tracing::error!("Error saving snapshot for {}: {}", self.key, e);
        }
    }

    fn try_save(&self, snapshot: &PersistedSnapshot) -> Result<(), AppError> {
        if snapshot.key != self.key {
            return Err(AppError::InvalidState(format!(
                "snapshot for {} cannot be written under {}",
                snapshot.key, self.key
            )));
        }
        let raw = serde_json::to_string(snapshot)?;
        self.store.set(&self.key.storage_key(), &raw)
    }

    pub fn purge(&self) {
        match self.store.remove(&self.key.storage_key()) {
            Ok(()) => tracing::info!("Cleared exam session storage for {}", self.key),
            Err(e) => tracing::error!("Error clearing exam session for {}: {}", self.key, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn snapshot(key: AttemptKey) -> PersistedSnapshot {
        PersistedSnapshot {
            key,
            answers: HashMap::from([(3, "B".to_string())]),
            time_left_seconds: 1800,
            current_question_index: 2,
            violation_count: 1,
        }
    }

    #[test]
    fn saved_snapshot_loads_back() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let key = AttemptKey::new(11, 5);
        let persistence = SessionPersistence::new(store, key);

        persistence.save(&snapshot(key));
        assert_eq!(persistence.load(), Some(snapshot(key)));

        persistence.purge();
        assert_eq!(persistence.load(), None);
    }

    #[test]
    fn snapshot_is_never_read_across_attempts() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mine = SessionPersistence::new(store.clone(), AttemptKey::new(11, 5));
        let other = SessionPersistence::new(store.clone(), AttemptKey::new(11, 6));

        mine.save(&snapshot(AttemptKey::new(11, 5)));
        assert_eq!(other.load(), None);

        // A foreign snapshot planted under our key is ignored too.
        let foreign = serde_json::to_string(&snapshot(AttemptKey::new(12, 5))).unwrap();
        store.set(&AttemptKey::new(11, 6).storage_key(), &foreign).unwrap();
        assert_eq!(other.load(), None);
    }

    #[test]
    fn corrupt_snapshot_is_ignored() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let key = AttemptKey::new(1, 1);
        store.set(&key.storage_key(), "not json").unwrap();

        assert_eq!(SessionPersistence::new(store, key).load(), None);
    }
}
