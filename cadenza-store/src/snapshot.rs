//! Persisted orchestrator state: the active-task set and the completed
//! artifact library, each stored as a JSON array under its own key.
//!
//! Loading is forgiving. Entries that fail to decode are skipped with a
//! warning, tasks that are terminal or already at 100% are never restored,
//! and repeated ids collapse to their first occurrence.

use std::collections::HashSet;

use cadenza_core::{merge, Artifact, GenerationTask};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::kv::KeyValueStore;

pub const ACTIVE_TASKS_KEY: &str = "active-tasks";
pub const COMPLETED_ARTIFACTS_KEY: &str = "completed-artifacts";

/// Everything the orchestrator needs to resume after a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub active_tasks: Vec<GenerationTask>,
    pub completed_artifacts: Vec<Artifact>,
}

impl PersistedState {
    /// Load both keys. Each half falls back to empty on error.
    pub async fn load(store: &dyn KeyValueStore) -> Self {
        let active_tasks = load_active_tasks(store).await.unwrap_or_else(|err| {
            tracing::error!(error = %err, "failed to load active tasks; starting empty");
            Vec::new()
        });
        let completed_artifacts = load_completed_artifacts(store)
            .await
            .unwrap_or_else(|err| {
                tracing::error!(error = %err, "failed to load artifact library; starting empty");
                Vec::new()
            });
        if !active_tasks.is_empty() {
            tracing::info!(count = active_tasks.len(), "restored active tasks from previous session");
        }
        Self {
            active_tasks,
            completed_artifacts,
        }
    }
}

/// Restorable tasks from the active-task key, in stored order.
pub async fn load_active_tasks(
    store: &dyn KeyValueStore,
) -> Result<Vec<GenerationTask>, StoreError> {
    let decoded: Vec<GenerationTask> = load_entries(store, ACTIVE_TASKS_KEY).await?;
    let mut seen = HashSet::new();
    let mut restored = Vec::with_capacity(decoded.len());
    for task in decoded {
        if !task.is_restorable() {
            tracing::info!(
                task_id = %task.task_id,
                status = %task.status,
                progress = task.progress,
                "skipping finished task from previous session",
            );
            continue;
        }
        if !seen.insert(task.task_id.clone()) {
            tracing::warn!(task_id = %task.task_id, "duplicate task in snapshot; keeping first");
            continue;
        }
        restored.push(task);
    }
    Ok(restored)
}

/// The artifact library, deduplicated by id.
pub async fn load_completed_artifacts(
    store: &dyn KeyValueStore,
) -> Result<Vec<Artifact>, StoreError> {
    let decoded: Vec<Artifact> = load_entries(store, COMPLETED_ARTIFACTS_KEY).await?;
    Ok(merge(Vec::new(), decoded).collection)
}

/// Write the restorable subset of `tasks`; delete the key when none remain.
pub async fn save_active_tasks(
    store: &dyn KeyValueStore,
    tasks: &[GenerationTask],
) -> Result<(), StoreError> {
    let restorable: Vec<&GenerationTask> = tasks.iter().filter(|t| t.is_restorable()).collect();
    if restorable.is_empty() {
        return store.delete(ACTIVE_TASKS_KEY).await;
    }
    let json = serde_json::to_string(&restorable)?;
    store.set(ACTIVE_TASKS_KEY, &json).await
}

pub async fn save_completed_artifacts(
    store: &dyn KeyValueStore,
    artifacts: &[Artifact],
) -> Result<(), StoreError> {
    let json = serde_json::to_string(artifacts)?;
    store.set(COMPLETED_ARTIFACTS_KEY, &json).await
}

async fn load_entries<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Vec<T>, StoreError> {
    let Some(contents) = store.get(key).await? else {
        return Ok(Vec::new());
    };
    let raw: Vec<Value> = serde_json::from_str(&contents)?;
    let total = raw.len();
    let entries: Vec<T> = raw
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key, error = %err, "dropping undecodable snapshot entry");
                None
            }
        })
        .collect();
    if entries.len() < total {
        tracing::warn!(key, kept = entries.len(), total, "snapshot partially recovered");
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use cadenza_core::{SubmissionParams, TaskId, TaskStatus};
    use chrono::Utc;

    fn task(id: &str, status: TaskStatus, progress: u8) -> GenerationTask {
        let mut task = GenerationTask::new(
            TaskId::from(id),
            SubmissionParams {
                prompt: "p".to_string(),
                model: "V4".to_string(),
            },
            Utc::now(),
        );
        task.status = status;
        task.progress = progress;
        task
    }

    #[tokio::test]
    async fn save_filters_terminal_and_complete_tasks() {
        let store = MemoryStore::new();
        save_active_tasks(
            &store,
            &[
                task("live", TaskStatus::TextSuccess, 40),
                task("failed", TaskStatus::CallbackException, 0),
                task("done", TaskStatus::FirstSuccess, 100),
            ],
        )
        .await
        .unwrap();

        let restored = load_active_tasks(&store).await.unwrap();
        let ids: Vec<_> = restored.iter().map(|t| t.task_id.0.as_str()).collect();
        assert_eq!(ids, ["live"]);
    }

    #[tokio::test]
    async fn saving_nothing_restorable_clears_the_key() {
        let store = MemoryStore::new();
        save_active_tasks(&store, &[task("t1", TaskStatus::Pending, 20)])
            .await
            .unwrap();
        assert!(store.contains(ACTIVE_TASKS_KEY).await);

        save_active_tasks(&store, &[]).await.unwrap();
        assert!(!store.contains(ACTIVE_TASKS_KEY).await);
    }

    #[tokio::test]
    async fn corrupt_snapshot_loads_as_empty_state() {
        let store = MemoryStore::new()
            .with_entry(ACTIVE_TASKS_KEY, "{not json")
            .with_entry(COMPLETED_ARTIFACTS_KEY, "[]");
        let state = PersistedState::load(&store).await;
        assert!(state.active_tasks.is_empty());
        assert!(state.completed_artifacts.is_empty());
    }
}
