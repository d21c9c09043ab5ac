//! Error types for cadenza-store.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("state JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Keys become file names, so they are restricted to `[A-Za-z0-9_-]`.
    #[error("invalid store key '{0}'")]
    InvalidKey(String),

    /// The blocking worker running a file operation panicked or was cancelled.
    #[error("store worker failed: {0}")]
    Worker(String),
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
