use grader_core::model::{GradeStatus, PartLabel, Qtag, UnitId};
use sqlx::Row;

use crate::repository::{GradeEventRecord, NewGradeEvent, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn latency_to_i64(latency_ms: u64) -> i64 {
    i64::try_from(latency_ms).unwrap_or(i64::MAX)
}

pub(crate) fn latency_from_i64(value: i64) -> Result<u64, StorageError> {
    u64::try_from(value)
        .map_err(|_| StorageError::Serialization(format!("invalid latency_ms: {value}")))
}

pub(crate) fn map_grade_event_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<GradeEventRecord, StorageError> {
    let result: String = row.try_get("result").map_err(ser)?;
    Ok(GradeEventRecord {
        id: row.try_get("id").map_err(ser)?,
        event: NewGradeEvent {
            unit_id: UnitId::new(row.try_get::<String, _>("unit_id").map_err(ser)?),
            qtag: Qtag::new(row.try_get::<String, _>("qtag").map_err(ser)?),
            part_label: PartLabel::new(row.try_get::<String, _>("part_label").map_err(ser)?),
            model: row.try_get("model").map_err(ser)?,
            result: GradeStatus::from(result),
            latency_ms: latency_from_i64(row.try_get("latency_ms").map_err(ser)?)?,
            created_at: row.try_get("created_at").map_err(ser)?,
        },
    })
}
