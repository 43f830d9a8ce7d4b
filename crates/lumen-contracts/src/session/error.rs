use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("session file not found: {0}")]
    MissingFile(PathBuf),

    #[error("session document is not valid: {0}")]
    InvalidDocument(#[source] serde_json::Error),

    #[error("session persistence failed: {0}")]
    Other(String),
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::Other(err.to_string())
    }
}
