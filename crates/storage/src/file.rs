use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::repository::{SessionBlobStore, StorageError};

/// Stores each blob as `<dir>/<key>.json`.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// reader never observes a half-written blob.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

#[async_trait]
impl SessionBlobStore for FileBlobStore {
    async fn load_blob(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(blob) => Ok(Some(blob)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    async fn save_blob(&self, key: &str, blob: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.path_for(key);
        let tmp = target.with_extension("json.tmp");
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path());
        assert_eq!(store.load_blob("llmgrader.session").await.unwrap(), None);
    }

    #[tokio::test]
    async fn saves_and_reloads_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path().join("nested"));
        store.save_blob("llmgrader.session", "{\"u\":{}}").await.unwrap();

        let reopened = FileBlobStore::new(dir.path().join("nested"));
        assert_eq!(
            reopened.load_blob("llmgrader.session").await.unwrap().as_deref(),
            Some("{\"u\":{}}")
        );
        assert!(!dir.path().join("nested/llmgrader.session.json.tmp").exists());
    }

    #[test]
    fn keys_are_sanitized_into_file_names() {
        let store = FileBlobStore::new("/tmp/x");
        assert_eq!(
            store.path_for("a/b c"),
            PathBuf::from("/tmp/x/a_b_c.json")
        );
    }
}
