use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use grader_core::model::{Question, Unit, UnitId};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::UnitProvider;
use crate::error::UnitProviderError;

/// File each unit directory must contain.
pub const UNIT_FILE_NAME: &str = "unit.json";

#[derive(Debug, Deserialize)]
struct UnitFile {
    questions: Vec<Question>,
}

/// Discovers units as subdirectories of a root folder.
///
/// A subdirectory is a unit when it contains [`UNIT_FILE_NAME`]. Units that
/// fail to parse are skipped with a warning so one bad upload does not hide
/// the rest.
pub struct DirUnitProvider {
    root: PathBuf,
    units: RwLock<BTreeMap<UnitId, Unit>>,
}

impl DirUnitProvider {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            units: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build a provider and run discovery once.
    ///
    /// # Errors
    ///
    /// Returns `UnitProviderError::Io` if the root cannot be listed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, UnitProviderError> {
        let provider = Self::new(root);
        provider.reload().await?;
        Ok(provider)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn discover(&self) -> Result<BTreeMap<UnitId, Unit>, UnitProviderError> {
        let io_err = |path: &Path, source| UnitProviderError::Io {
            path: path.display().to_string(),
            source,
        };

        let mut found = BTreeMap::new();
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| io_err(&self.root, e))?;

        while let Some(item) = dir.next_entry().await.map_err(|e| io_err(&self.root, e))? {
            let folder = item.path();
            if !item.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let Some(name) = folder.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let unit_path = folder.join(UNIT_FILE_NAME);
            if !tokio::fs::try_exists(&unit_path).await.unwrap_or(false) {
                debug!(folder = %folder.display(), "skipping folder without {UNIT_FILE_NAME}");
                continue;
            }

            match load_unit(UnitId::new(name), &unit_path).await {
                Ok(unit) => {
                    debug!(unit = %unit.id(), questions = unit.questions().len(), "discovered unit");
                    found.insert(unit.id().clone(), unit);
                }
                Err(err) => warn!(folder = %folder.display(), error = %err, "skipping invalid unit"),
            }
        }

        if found.is_empty() {
            warn!(root = %self.root.display(), "no valid units found");
        }
        Ok(found)
    }
}

async fn load_unit(id: UnitId, path: &Path) -> Result<Unit, UnitProviderError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| UnitProviderError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let file: UnitFile = serde_json::from_str(&raw).map_err(|e| UnitProviderError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(Unit::new(id, file.questions)?)
}

#[async_trait]
impl UnitProvider for DirUnitProvider {
    async fn list_units(&self) -> Result<Vec<UnitId>, UnitProviderError> {
        let guard = self.units.read().map_err(|e| UnitProviderError::Io {
            path: self.root.display().to_string(),
            source: std::io::Error::other(e.to_string()),
        })?;
        Ok(guard.keys().cloned().collect())
    }

    async fn get_unit(&self, id: &UnitId) -> Result<Unit, UnitProviderError> {
        let guard = self.units.read().map_err(|e| UnitProviderError::Io {
            path: self.root.display().to_string(),
            source: std::io::Error::other(e.to_string()),
        })?;
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| UnitProviderError::UnknownUnit(id.clone()))
    }

    async fn reload(&self) -> Result<(), UnitProviderError> {
        let found = self.discover().await?;
        info!(root = %self.root.display(), units = found.len(), "unit discovery complete");
        let mut guard = self.units.write().map_err(|e| UnitProviderError::Io {
            path: self.root.display().to_string(),
            source: std::io::Error::other(e.to_string()),
        })?;
        *guard = found;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grader_core::model::Qtag;

    const UNIT_JSON: &str = r#"{
        "questions": [
            {"qtag": "q1", "text": "Compute the current.", "grade": true,
             "parts": [{"label": "a", "points": 5}, {"label": "b", "points": 5}],
             "reference_solution": "I = V/R", "grading_notes": "Units required."},
            {"qtag": "q2", "text": "Warm-up", "grade": false, "points": 2}
        ]
    }"#;

    fn write_unit(root: &Path, name: &str, body: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(UNIT_FILE_NAME), body).unwrap();
    }

    #[tokio::test]
    async fn discovers_units_sorted_by_name() {
        let root = tempfile::tempdir().unwrap();
        write_unit(root.path(), "unit2", UNIT_JSON);
        write_unit(root.path(), "unit1", UNIT_JSON);
        std::fs::create_dir_all(root.path().join("empty")).unwrap();
        std::fs::write(root.path().join("stray.txt"), "x").unwrap();

        let provider = DirUnitProvider::open(root.path()).await.unwrap();
        let ids = provider.list_units().await.unwrap();
        assert_eq!(ids, [UnitId::new("unit1"), UnitId::new("unit2")]);

        let unit = provider.get_unit(&UnitId::new("unit1")).await.unwrap();
        assert_eq!(unit.qtags(), [Qtag::new("q1"), Qtag::new("q2")]);
        let q1 = unit.question(&Qtag::new("q1")).unwrap();
        assert_eq!(q1.total_points(), 10);
        assert_eq!(q1.reference_solution(), "I = V/R");
    }

    #[tokio::test]
    async fn invalid_units_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        write_unit(root.path(), "good", UNIT_JSON);
        write_unit(root.path(), "broken", "{ not json");
        write_unit(
            root.path(),
            "dupes",
            r#"{"questions":[{"qtag":"q1"},{"qtag":"q1"}]}"#,
        );

        let provider = DirUnitProvider::open(root.path()).await.unwrap();
        assert_eq!(provider.list_units().await.unwrap(), [UnitId::new("good")]);
    }

    #[tokio::test]
    async fn reload_picks_up_changes() {
        let root = tempfile::tempdir().unwrap();
        write_unit(root.path(), "unit1", UNIT_JSON);
        let provider = DirUnitProvider::open(root.path()).await.unwrap();

        write_unit(
            root.path(),
            "unit1",
            r#"{"questions":[{"qtag":"q1","grade":true,"points":3}]}"#,
        );
        provider.reload().await.unwrap();

        let unit = provider.get_unit(&UnitId::new("unit1")).await.unwrap();
        assert_eq!(unit.qtags(), [Qtag::new("q1")]);
    }

    #[tokio::test]
    async fn unknown_unit_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let provider = DirUnitProvider::open(root.path()).await.unwrap();
        let err = provider.get_unit(&UnitId::new("nope")).await.unwrap_err();
        assert!(matches!(err, UnitProviderError::UnknownUnit(_)));
    }

    #[tokio::test]
    async fn missing_root_fails() {
        let root = tempfile::tempdir().unwrap();
        let result = DirUnitProvider::open(root.path().join("absent")).await;
        assert!(matches!(result, Err(UnitProviderError::Io { .. })));
    }
}
