use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use crate::repository::{SessionBlobStore, StorageError};

use super::SqliteRepository;

#[async_trait]
impl SessionBlobStore for SqliteRepository {
    async fn load_blob(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT blob
            FROM session_blobs
            WHERE key = ?1
            ",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        row.map(|row| {
            row.try_get::<String, _>("blob")
                .map_err(|err| StorageError::Serialization(err.to_string()))
        })
        .transpose()
    }

    async fn save_blob(&self, key: &str, blob: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO session_blobs (key, blob, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                blob = excluded.blob,
                updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(blob)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }
}
