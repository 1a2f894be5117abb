//! Error types for the run/fix store.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run {0} not found")]
    RunNotFound(i64),

    #[error("Store connection lock poisoned")]
    LockPoisoned,

    #[error("Blocking store task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::RunNotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
