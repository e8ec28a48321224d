use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grader_core::model::{GradeStatus, PartLabel, Qtag, UnitId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable key-value port holding whole serialized session blobs.
#[async_trait]
pub trait SessionBlobStore: Send + Sync {
    /// Read the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read. A missing key is
    /// `Ok(None)`, not an error.
    async fn load_blob(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn save_blob(&self, key: &str, blob: &str) -> Result<(), StorageError>;
}

/// One grading call as written to the grade event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGradeEvent {
    pub unit_id: UnitId,
    pub qtag: Qtag,
    pub part_label: PartLabel,
    pub model: String,
    pub result: GradeStatus,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Persisted grade event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeEventRecord {
    pub id: i64,
    pub event: NewGradeEvent,
}

/// Append-only log of grading calls, read by the analytics viewer.
#[async_trait]
pub trait GradeLogRepository: Send + Sync {
    /// Append an event and return its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the event cannot be stored.
    async fn record(&self, event: NewGradeEvent) -> Result<i64, StorageError>;

    /// Most recent events first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn recent(&self, limit: u32) -> Result<Vec<GradeEventRecord>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    blobs: Arc<Mutex<HashMap<String, String>>>,
    events: Arc<Mutex<Vec<GradeEventRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionBlobStore for InMemoryRepository {
    async fn load_blob(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .blobs
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn save_blob(&self, key: &str, blob: &str) -> Result<(), StorageError> {
        let mut guard = self
            .blobs
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

#[async_trait]
impl GradeLogRepository for InMemoryRepository {
    async fn record(&self, event: NewGradeEvent) -> Result<i64, StorageError> {
        let mut guard = self
            .events
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let id = i64::try_from(guard.len()).unwrap_or(i64::MAX - 1) + 1;
        guard.push(GradeEventRecord { id, event });
        Ok(id)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<GradeEventRecord>, StorageError> {
        let guard = self
            .events
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(guard.iter().rev().take(limit).cloned().collect())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub session_blobs: Arc<dyn SessionBlobStore>,
    pub grade_log: Arc<dyn GradeLogRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let session_blobs: Arc<dyn SessionBlobStore> = Arc::new(repo.clone());
        let grade_log: Arc<dyn GradeLogRepository> = Arc::new(repo);
        Self {
            session_blobs,
            grade_log,
        }
    }
}
