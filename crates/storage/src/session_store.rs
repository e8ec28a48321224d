use std::collections::HashSet;
use std::sync::Arc;

use grader_core::model::{EntryPatch, Qtag, SessionEntry, SessionState, UnitId, UnitSessions};
use tracing::{debug, error, warn};

use crate::repository::{SessionBlobStore, StorageError};

/// Fixed storage name of the session blob.
pub const SESSION_STORAGE_KEY: &str = "llmgrader.session";

/// Result of [`SessionStore::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A blob was found and parsed.
    Loaded { units: usize },
    /// Nothing persisted yet.
    Empty,
    /// The blob was unreadable or malformed and state was reset to empty.
    Reset,
}

/// In-memory `unit → qtag → entry` mapping backed by a durable blob.
///
/// Every mutation goes through [`SessionStore::update`],
/// [`SessionStore::prune`] or [`SessionStore::replace_unit`] and is written
/// back as a whole blob. Concurrent writers on the same backend can lose
/// updates; one writer per backend is assumed.
pub struct SessionStore {
    backend: Arc<dyn SessionBlobStore>,
    key: String,
    state: SessionState,
}

impl SessionStore {
    #[must_use]
    pub fn new(backend: Arc<dyn SessionBlobStore>) -> Self {
        Self::with_key(backend, SESSION_STORAGE_KEY)
    }

    #[must_use]
    pub fn with_key(backend: Arc<dyn SessionBlobStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            state: SessionState::new(),
        }
    }

    /// Build a store and immediately [`load`](Self::load) it.
    pub async fn open(backend: Arc<dyn SessionBlobStore>) -> Self {
        let mut store = Self::new(backend);
        store.load().await;
        store
    }

    /// Replace in-memory state with the persisted blob.
    ///
    /// Never fails: unreadable or malformed blobs are logged and the state is
    /// reset to empty.
    pub async fn load(&mut self) -> LoadOutcome {
        let blob = match self.backend.load_blob(&self.key).await {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                self.state = SessionState::new();
                return LoadOutcome::Empty;
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "session blob unreadable; starting empty");
                self.state = SessionState::new();
                return LoadOutcome::Reset;
            }
        };

        if blob.trim().is_empty() {
            self.state = SessionState::new();
            return LoadOutcome::Empty;
        }

        match serde_json::from_str::<SessionState>(&blob) {
            Ok(state) => {
                let units = state.len();
                debug!(key = %self.key, units, "session blob loaded");
                self.state = state;
                LoadOutcome::Loaded { units }
            }
            Err(err) => {
                error!(key = %self.key, error = %err, "malformed session blob; resetting to empty");
                self.state = SessionState::new();
                LoadOutcome::Reset
            }
        }
    }

    /// Serialize the whole mapping and write it back.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if serialization or the write fails. In-memory
    /// state is kept either way.
    pub async fn save(&self) -> Result<(), StorageError> {
        let blob = serde_json::to_string(&self.state)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        if let Err(err) = self.backend.save_blob(&self.key, &blob).await {
            error!(key = %self.key, error = %err, "failed to persist session blob");
            return Err(err);
        }
        Ok(())
    }

    /// Materializing read: returns the entry, creating an empty one if absent.
    pub fn get(&mut self, unit: &UnitId, qtag: &Qtag) -> &SessionEntry {
        self.entry_mut(unit, qtag)
    }

    /// Non-materializing read.
    #[must_use]
    pub fn entry(&self, unit: &UnitId, qtag: &Qtag) -> Option<&SessionEntry> {
        self.state.get(unit).and_then(|entries| entries.get(qtag))
    }

    #[must_use]
    pub fn unit_entries(&self, unit: &UnitId) -> Option<&UnitSessions> {
        self.state.get(unit)
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Apply a patch to one entry and save immediately.
    ///
    /// # Errors
    ///
    /// Returns the save error; the patch stays applied in memory.
    pub async fn update(
        &mut self,
        unit: &UnitId,
        qtag: &Qtag,
        patch: EntryPatch,
    ) -> Result<(), StorageError> {
        self.entry_mut(unit, qtag).apply(patch);
        self.save().await
    }

    /// Drop every entry of `unit` whose qtag is not in `valid`.
    ///
    /// Saves only when something was removed. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns the save error when a save was attempted and failed.
    pub async fn prune(&mut self, unit: &UnitId, valid: &[Qtag]) -> Result<usize, StorageError> {
        let Some(entries) = self.state.get_mut(unit) else {
            return Ok(0);
        };
        let keep: HashSet<&Qtag> = valid.iter().collect();
        let before = entries.len();
        entries.retain(|qtag, _| keep.contains(qtag));
        let removed = before - entries.len();

        if removed > 0 {
            debug!(unit = %unit, removed, "pruned stale session entries");
            self.save().await?;
        }
        Ok(removed)
    }

    /// Overwrite all entries of `unit` wholesale and save.
    ///
    /// # Errors
    ///
    /// Returns the save error; the replacement stays applied in memory.
    pub async fn replace_unit(
        &mut self,
        unit: &UnitId,
        entries: UnitSessions,
    ) -> Result<(), StorageError> {
        self.state.insert(unit.clone(), entries);
        self.save().await
    }

    fn entry_mut(&mut self, unit: &UnitId, qtag: &Qtag) -> &mut SessionEntry {
        self.state
            .entry(unit.clone())
            .or_default()
            .entry(qtag.clone())
            .or_default()
    }
}
