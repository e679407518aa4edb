//! Structured error types, one enum per layer, following the same split the
//! rest of the ambient stack uses: a top-level `IndexError` that callers see,
//! plus narrower errors for the store, the watcher and per-item import work.

use crate::types::{IdCode, UnitName};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type returned by the facade.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("failed to read file '{path}': {source}")]
    FileRead { path: PathBuf, source: std::io::Error },

    #[error("failed to write file '{path}': {source}")]
    FileWrite { path: PathBuf, source: std::io::Error },

    #[error("store transaction failed: {0}")]
    Store(#[from] StoreError),

    #[error("file watcher error: {0}")]
    Watch(#[from] WatchError),

    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error("unit '{name}' not found")]
    UnitNotFound { name: UnitName },

    #[error("index appears to be corrupted: {reason}")]
    IndexCorrupted { reason: String },

    #[error("{0}")]
    General(String),
}

impl IndexError {
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Store(StoreError::MapFull { .. }) => vec![
                "the store's arena budget was doubled and the write retried automatically",
                "if this recurs, raise `store.initial_map_size` in settings.toml",
            ],
            Self::Store(_) => vec![
                "re-run the import: the failed transaction was rolled back and the store is consistent",
            ],
            Self::IndexCorrupted { .. } => vec![
                "delete the index directory and re-import from the store",
            ],
            Self::Config { .. } => vec!["run `symbindex init` to write a default configuration"],
            _ => vec![],
        }
    }
}

pub type IndexResult<T> = Result<T, IndexError>;

/// Errors from the persistent store (4.C).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("write transaction exceeded its arena budget (attempt {attempt}/{max_attempts})")]
    MapFull { attempt: u32, max_attempts: u32 },

    #[error("document not found for key {0}")]
    DocumentNotFound(IdCode),

    #[error("no active write transaction")]
    NoActiveTransaction,

    #[error("internal lock was poisoned")]
    LockPoisoned,

    #[error("(de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the file-system watcher integration (§6).
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to initialize watcher: {0}")]
    Init(#[from] notify::Error),

    #[error("watch target does not exist: {0}")]
    MissingPath(PathBuf),
}

pub type WatchResult<T> = Result<T, WatchError>;

/// Per-unit/per-record import failures (§7): always confined to the
/// affected item, never escalated to an `IndexError`.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("unit file '{name}' is missing or unreadable: {source}")]
    UnitUnreadable { name: UnitName, source: std::io::Error },

    #[error("unit file '{name}' is malformed: {reason}")]
    UnitMalformed { name: UnitName, reason: String },

    #[error("record '{name}' is unreadable: {source}")]
    RecordUnreadable { name: Box<str>, source: std::io::Error },

    #[error("record '{name}' is malformed: {reason}")]
    RecordMalformed { name: Box<str>, reason: String },
}

pub type ImportResult<T> = Result<T, ImportError>;

/// Adds file-path context to a low-level `Result`, in the same style the
/// rest of the ambient stack uses for turning `io::Error` into `IndexError`.
pub trait ErrorContext<T> {
    fn with_path(self, path: &std::path::Path) -> IndexResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_path(self, path: &std::path::Path) -> IndexResult<T> {
        self.map_err(|e| IndexError::General(format!("error processing '{}': {e}", path.display())))
    }
}
