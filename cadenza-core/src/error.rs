//! Error types for cadenza-core.

use thiserror::Error;

/// All errors that can arise from core decoding and validation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The provider status payload was not valid JSON or lacked a status.
    #[error("failed to decode provider payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// A task id was blank after trimming.
    #[error("task id must not be empty")]
    EmptyTaskId,
}
