use async_trait::async_trait;

use crate::repository::{GradeEventRecord, GradeLogRepository, NewGradeEvent, StorageError};

use super::SqliteRepository;
use super::mapping::{latency_to_i64, map_grade_event_row};

#[async_trait]
impl GradeLogRepository for SqliteRepository {
    async fn record(&self, event: NewGradeEvent) -> Result<i64, StorageError> {
        let result = sqlx::query(
            r"
            INSERT INTO grade_events (
                unit_id,
                qtag,
                part_label,
                model,
                result,
                latency_ms,
                created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(event.unit_id.as_str())
        .bind(event.qtag.as_str())
        .bind(event.part_label.as_str())
        .bind(&event.model)
        .bind(event.result.as_str())
        .bind(latency_to_i64(event.latency_ms))
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<GradeEventRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, unit_id, qtag, part_label, model, result, latency_ms, created_at
            FROM grade_events
            ORDER BY id DESC
            LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        rows.iter().map(map_grade_event_row).collect()
    }
}
