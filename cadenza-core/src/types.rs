//! Domain types for generation tasks and their artifacts.
//!
//! Persisted JSON uses camelCase field names; statuses are stored as the
//! provider's raw SCREAMING_SNAKE strings so unknown values survive a
//! save/load cycle unchanged.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Provider-assigned identifier of a generation task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Validate a user- or provider-supplied id, rejecting blank input.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::EmptyTaskId);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Provider-assigned identifier of a finished artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub String);

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ArtifactId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ArtifactId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Provider-reported stage of a generation task.
///
/// `Other` carries any status string this build does not recognise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    #[default]
    Pending,
    TextSuccess,
    FirstSuccess,
    Success,
    CreateTaskFailed,
    GenerateAudioFailed,
    CallbackException,
    SensitiveWordError,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::TextSuccess => "TEXT_SUCCESS",
            TaskStatus::FirstSuccess => "FIRST_SUCCESS",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::CreateTaskFailed => "CREATE_TASK_FAILED",
            TaskStatus::GenerateAudioFailed => "GENERATE_AUDIO_FAILED",
            TaskStatus::CallbackException => "CALLBACK_EXCEPTION",
            TaskStatus::SensitiveWordError => "SENSITIVE_WORD_ERROR",
            TaskStatus::Other(raw) => raw,
        }
    }

    /// One of the four provider failure codes.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TaskStatus::CreateTaskFailed
                | TaskStatus::GenerateAudioFailed
                | TaskStatus::CallbackException
                | TaskStatus::SensitiveWordError
        )
    }

    /// `SUCCESS` or any failure code. Unknown statuses are never terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success) || self.is_failure()
    }

    /// Fixed progress for a known status; `None` for unrecognised ones.
    pub fn progress(&self) -> Option<u8> {
        match self {
            TaskStatus::Pending => Some(20),
            TaskStatus::TextSuccess => Some(40),
            TaskStatus::FirstSuccess => Some(70),
            TaskStatus::Success => Some(100),
            TaskStatus::Other(_) => None,
            _ => Some(0),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for TaskStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "PENDING" => TaskStatus::Pending,
            "TEXT_SUCCESS" => TaskStatus::TextSuccess,
            "FIRST_SUCCESS" => TaskStatus::FirstSuccess,
            "SUCCESS" => TaskStatus::Success,
            "CREATE_TASK_FAILED" => TaskStatus::CreateTaskFailed,
            "GENERATE_AUDIO_FAILED" => TaskStatus::GenerateAudioFailed,
            "CALLBACK_EXCEPTION" => TaskStatus::CallbackException,
            "SENSITIVE_WORD_ERROR" => TaskStatus::SensitiveWordError,
            _ => TaskStatus::Other(raw),
        }
    }
}

impl From<&str> for TaskStatus {
    fn from(raw: &str) -> Self {
        TaskStatus::from(raw.to_owned())
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Other(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// What the task was submitted with; used as a fallback when the provider
/// omits prompt or model on a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionParams {
    pub prompt: String,
    pub model: String,
}

/// A finished, playable media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: ArtifactId,
    pub title: String,
    pub prompt: String,
    pub tags: String,
    pub duration_secs: f64,
    pub audio_url: String,
    pub stream_audio_url: String,
    pub image_url: String,
    pub model_name: String,
    pub created_at: DateTime<Utc>,
    pub task_id: TaskId,
}

impl Artifact {
    /// At least one media URL is present.
    pub fn is_playable(&self) -> bool {
        !self.audio_url.is_empty() || !self.stream_audio_url.is_empty()
    }

    /// The URL a player should open: full audio first, stream as fallback.
    pub fn playback_url(&self) -> Option<&str> {
        [self.audio_url.as_str(), self.stream_audio_url.as_str()]
            .into_iter()
            .find(|url| !url.is_empty())
    }
}

/// A single submitted generation request tracked through to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTask {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub progress: u8,
    pub status_message: String,
    #[serde(default)]
    pub provisional_artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub params: SubmissionParams,
    pub started_at: DateTime<Utc>,
}

impl GenerationTask {
    /// A freshly submitted task: `PENDING`, progress 0.
    pub fn new(task_id: TaskId, params: SubmissionParams, started_at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            progress: 0,
            status_message: "Submitted, waiting for provider...".to_string(),
            provisional_artifacts: Vec::new(),
            error: None,
            params,
            started_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Eligible for the crash-recovery snapshot: non-terminal and below 100%.
    pub fn is_restorable(&self) -> bool {
        !self.is_terminal() && self.progress < 100
    }

    /// Merge a partial update in place. Fields left `None` are untouched.
    pub fn apply_patch(&mut self, patch: TaskPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(progress) = patch.progress {
            self.progress = progress.min(100);
        }
        if let Some(message) = patch.status_message {
            self.status_message = message;
        }
        if let Some(artifacts) = patch.provisional_artifacts {
            self.provisional_artifacts = artifacts;
        }
        if let Some(error) = patch.error {
            self.error = error;
        }
    }
}

/// Partial update for [`GenerationTask`]. `error: Some(None)` clears the error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
    pub status_message: Option<String>,
    pub provisional_artifacts: Option<Vec<Artifact>>,
    pub error: Option<Option<String>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
