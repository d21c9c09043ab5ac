use std::path::PathBuf;

use thiserror::Error;

use cadenza_core::TaskId;

/// Error surface for the orchestrator, its collaborators, and the control socket.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] cadenza_store::StoreError),

    #[error("core error: {0}")]
    Core(#[from] cadenza_core::CoreError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse config at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("task {0} is already being tracked")]
    DuplicateTask(TaskId),

    #[error("no artifact with id '{0}' in the library")]
    UnknownArtifact(String),

    #[error("audio engine error: {0}")]
    Playback(String),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

/// Failures talking to the generation provider.
///
/// Every variant is transient from the poller's point of view.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned code {code}: {message}")]
    Api { code: i64, message: String },

    #[error("failed to decode provider response: {0}")]
    Decode(String),

    #[error("invalid generation request: {0}")]
    InvalidRequest(String),

    #[error("missing API key; set ${0}")]
    MissingApiKey(String),

    #[error("provider worker failed: {0}")]
    Worker(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
