use std::sync::Arc;

use grader_core::model::{EntryPatch, GradeStatus, PartLabel, PartPatch, Qtag, UnitId};
use grader_core::time::fixed_now;
use storage::repository::{GradeLogRepository, NewGradeEvent, SessionBlobStore};
use storage::sqlite::SqliteRepository;
use storage::{LoadOutcome, SESSION_STORAGE_KEY, SessionStore};

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!(
        "sqlite:file:{name}?mode=memory&cache=shared"
    ))
    .await
    .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_session_blob_survives_reopen() {
    let repo = connect("memdb_session_blob").await;
    let unit = UnitId::new("unit1");
    let qtag = Qtag::new("q1");

    let mut store = SessionStore::new(Arc::new(repo.clone()));
    store
        .update(&unit, &qtag, EntryPatch::Solution("F = ma".into()))
        .await
        .unwrap();
    store
        .update(
            &unit,
            &qtag,
            EntryPatch::Part {
                label: PartLabel::new("b"),
                patch: PartPatch::verdict(GradeStatus::Fail, "check units", "wrong units"),
            },
        )
        .await
        .unwrap();

    let mut reopened = SessionStore::new(Arc::new(repo));
    assert_eq!(reopened.load().await, LoadOutcome::Loaded { units: 1 });
    let entry = reopened.entry(&unit, &qtag).unwrap();
    assert_eq!(entry.student_solution, "F = ma");
    assert_eq!(
        entry.part(&PartLabel::new("b")).unwrap().grade_status,
        GradeStatus::Fail
    );
}

#[tokio::test]
async fn sqlite_blob_upsert_replaces_previous_value() {
    let repo = connect("memdb_blob_upsert").await;
    repo.save_blob(SESSION_STORAGE_KEY, "{}").await.unwrap();
    repo.save_blob(SESSION_STORAGE_KEY, "{\"u\":{}}").await.unwrap();
    assert_eq!(
        repo.load_blob(SESSION_STORAGE_KEY).await.unwrap().as_deref(),
        Some("{\"u\":{}}")
    );
    assert_eq!(repo.load_blob("other").await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_grade_log_lists_newest_first() {
    let repo = connect("memdb_grade_log").await;
    for (qtag, result) in [("q1", GradeStatus::Pass), ("q2", GradeStatus::Error)] {
        repo.record(NewGradeEvent {
            unit_id: UnitId::new("unit1"),
            qtag: Qtag::new(qtag),
            part_label: PartLabel::all(),
            model: "gpt-4.1-mini".into(),
            result,
            latency_ms: 850,
            created_at: fixed_now(),
        })
        .await
        .unwrap();
    }

    let recent = repo.recent(10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].event.qtag, Qtag::new("q2"));
    assert_eq!(recent[0].event.result, GradeStatus::Error);
    assert_eq!(recent[1].event.latency_ms, 850);
    assert_eq!(recent[1].event.created_at, fixed_now());
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = connect("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
}
