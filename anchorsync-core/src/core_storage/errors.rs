/*
    errors.rs - Map persistence errors
*/

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("No saved map at {0}")]
    NotFound(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Saved map at {path} is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: String },
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
