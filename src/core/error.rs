use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BioappError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Index {index} out of range for data store of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Data store is read-only: {0}")]
    ReadOnly(String),
    #[error("Validation error: {0}")]
    Validation(String),
}
