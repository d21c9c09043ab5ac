//! The task state transition function.
//!
//! ```text
//! PENDING ─▶ TEXT_SUCCESS ─▶ FIRST_SUCCESS ─▶ SUCCESS
//!    │             │               │
//!    └─────────────┴───────────────┴──▶ CREATE_TASK_FAILED | GENERATE_AUDIO_FAILED
//!                                       | CALLBACK_EXCEPTION | SENSITIVE_WORD_ERROR
//! ```
//!
//! [`apply`] is pure: the caller supplies `now`, used only as the creation
//! time of artifacts whose descriptor carries none. Merging into the library
//! and removing finished tasks are the caller's job.

use chrono::{DateTime, Utc};

use crate::payload::{MediaDescriptor, StatusPayload};
use crate::types::{Artifact, ArtifactId, GenerationTask, TaskStatus};

/// Result of applying one provider payload to one task.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub task: GenerationTask,
    /// Every artifact materialised on `SUCCESS`, playable or not. All of them
    /// belong in the permanent collection.
    pub library_candidates: Vec<Artifact>,
    /// The playable subset of `library_candidates`.
    pub newly_completed: Vec<Artifact>,
}

impl Transition {
    fn task_only(task: GenerationTask) -> Self {
        Self {
            task,
            library_candidates: Vec::new(),
            newly_completed: Vec::new(),
        }
    }
}

/// Apply `payload` to `current`.
///
/// Terminal tasks are returned unchanged. Unknown statuses are recorded
/// verbatim with progress and message untouched.
pub fn apply(current: &GenerationTask, payload: &StatusPayload, now: DateTime<Utc>) -> Transition {
    if current.is_terminal() {
        return Transition::task_only(current.clone());
    }

    let mut task = current.clone();
    task.status = payload.status.clone();

    let Some(progress) = payload.status.progress() else {
        return Transition::task_only(task);
    };

    if payload.status.is_failure() {
        let message = failure_message(&payload.status);
        task.progress = 0;
        task.status_message = message.clone();
        task.error = Some(message);
        return Transition::task_only(task);
    }

    task.progress = task.progress.max(progress);
    task.status_message = progress_message(&payload.status).to_string();
    task.error = None;

    match payload.status {
        TaskStatus::FirstSuccess => {
            let provisional: Vec<Artifact> = materialize_all(current, payload, now)
                .filter(Artifact::is_playable)
                .collect();
            if !provisional.is_empty() {
                task.provisional_artifacts = provisional;
            }
            Transition::task_only(task)
        }
        TaskStatus::Success => {
            let all: Vec<Artifact> = materialize_all(current, payload, now).collect();
            let playable: Vec<Artifact> =
                all.iter().filter(|a| a.is_playable()).cloned().collect();
            if !playable.is_empty() {
                task.provisional_artifacts = playable.clone();
            }
            Transition {
                task,
                library_candidates: all,
                newly_completed: playable,
            }
        }
        _ => Transition::task_only(task),
    }
}

/// `SENSITIVE_WORD_ERROR` → `Error: sensitive word error`.
pub fn failure_message(status: &TaskStatus) -> String {
    format!("Error: {}", status.as_str().replace('_', " ").to_lowercase())
}

fn progress_message(status: &TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "Preparing generation...",
        TaskStatus::TextSuccess => "Text generated, creating audio...",
        TaskStatus::FirstSuccess => "First track complete, generating variations...",
        TaskStatus::Success => "Complete! Tracks saved to library",
        _ => "",
    }
}

fn materialize_all<'a>(
    task: &'a GenerationTask,
    payload: &'a StatusPayload,
    now: DateTime<Utc>,
) -> impl Iterator<Item = Artifact> + 'a {
    payload
        .descriptors()
        .iter()
        .filter_map(move |descriptor| materialize(task, descriptor, now))
}

/// Map one descriptor to an artifact, or `None` when it has no usable id.
pub fn materialize(
    task: &GenerationTask,
    descriptor: &MediaDescriptor,
    now: DateTime<Utc>,
) -> Option<Artifact> {
    let id = non_empty(&descriptor.id)?;
    Some(Artifact {
        id: ArtifactId::from(id),
        title: non_empty(&descriptor.title).unwrap_or("Untitled").to_string(),
        prompt: non_empty(&descriptor.prompt)
            .unwrap_or(task.params.prompt.as_str())
            .to_string(),
        tags: descriptor.tags.clone().unwrap_or_default(),
        duration_secs: descriptor
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .unwrap_or(0.0),
        audio_url: descriptor.audio_url.clone().unwrap_or_default(),
        stream_audio_url: descriptor.stream_audio_url.clone().unwrap_or_default(),
        image_url: descriptor.image_url.clone().unwrap_or_default(),
        model_name: non_empty(&descriptor.model_name)
            .unwrap_or(task.params.model.as_str())
            .to_string(),
        created_at: descriptor.created_at().unwrap_or(now),
        task_id: task.task_id.clone(),
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SubmissionParams, TaskId};

    fn task() -> GenerationTask {
        GenerationTask::new(
            TaskId::from("t1"),
            SubmissionParams {
                prompt: "ambient piano".to_string(),
                model: "V4_5".to_string(),
            },
            Utc::now(),
        )
    }

    #[test]
    fn failure_message_is_lowercased_and_spaced() {
        assert_eq!(
            failure_message(&TaskStatus::GenerateAudioFailed),
            "Error: generate audio failed"
        );
    }

    #[test]
    fn descriptor_defaults_fall_back_to_submission() {
        let now = Utc::now();
        let artifact = materialize(
            &task(),
            &MediaDescriptor {
                id: Some("a1".to_string()),
                title: Some("   ".to_string()),
                ..MediaDescriptor::default()
            },
            now,
        )
        .expect("artifact");
        assert_eq!(artifact.title, "Untitled");
        assert_eq!(artifact.prompt, "ambient piano");
        assert_eq!(artifact.model_name, "V4_5");
        assert_eq!(artifact.duration_secs, 0.0);
        assert_eq!(artifact.created_at, now);
        assert_eq!(artifact.task_id, TaskId::from("t1"));
        assert!(!artifact.is_playable());
    }

    #[test]
    fn descriptor_without_id_is_dropped() {
        let dropped = materialize(
            &task(),
            &MediaDescriptor {
                audio_url: Some("https://cdn/x.mp3".to_string()),
                ..MediaDescriptor::default()
            },
            Utc::now(),
        );
        assert!(dropped.is_none());
    }

    #[test]
    fn terminal_task_is_never_left() {
        let mut done = task();
        done.status = TaskStatus::SensitiveWordError;
        done.progress = 0;
        let out = apply(&done, &StatusPayload::status_only("PENDING"), Utc::now());
        assert_eq!(out.task, done);
        assert!(out.library_candidates.is_empty());
    }

    #[test]
    fn regressed_status_does_not_lower_progress() {
        let mut current = task();
        current.status = TaskStatus::FirstSuccess;
        current.progress = 70;
        let out = apply(&current, &StatusPayload::status_only("TEXT_SUCCESS"), Utc::now());
        assert_eq!(out.task.status, TaskStatus::TextSuccess);
        assert_eq!(out.task.progress, 70);
    }
}
