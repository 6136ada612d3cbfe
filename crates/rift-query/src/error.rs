use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid graph document {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("graph document {path} has version {found}, expected {expected}")]
    Version { path: PathBuf, found: u32, expected: u32 },
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no changes detected between {old_ref} and {new_ref}")]
    NoChanges { old_ref: String, new_ref: String },

    #[error("analysis task failed: {0}")]
    Analysis(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
