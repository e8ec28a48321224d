#![forbid(unsafe_code)]

pub mod file;
pub mod repository;
pub mod session_store;
pub mod sqlite;

pub use file::FileBlobStore;
pub use repository::{
    GradeEventRecord, GradeLogRepository, InMemoryRepository, NewGradeEvent, SessionBlobStore,
    Storage, StorageError,
};
pub use session_store::{LoadOutcome, SESSION_STORAGE_KEY, SessionStore};
