//! The active-task registry.
//!
//! Owns the in-memory task set and writes it through to the store after
//! every mutation. The in-memory copy is authoritative; a failed write is
//! logged and the session carries on.
//!
//! Writes are ordered by a generation counter bumped under the task lock,
//! so a slow write of an older snapshot can never land after a newer one.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::{Mutex, Notify, RwLock};

use cadenza_core::{GenerationTask, TaskId, TaskPatch};
use cadenza_store::{snapshot, KeyValueStore};

use crate::error::DaemonError;

struct Slot {
    task: GenerationTask,
    /// Generation of the last mutation that touched this task.
    revision: u64,
}

struct Inner {
    tasks: IndexMap<TaskId, Slot>,
    generation: u64,
}

impl Inner {
    fn bump(&mut self) -> (u64, Vec<GenerationTask>) {
        self.generation += 1;
        (
            self.generation,
            self.tasks.values().map(|slot| slot.task.clone()).collect(),
        )
    }
}

/// Outcome of [`TaskRegistry::replace_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Replace {
    Replaced,
    /// The task is no longer tracked.
    Missing,
    /// The task was modified after the revision the caller read.
    Stale,
}

pub struct TaskRegistry {
    inner: RwLock<Inner>,
    store: Arc<dyn KeyValueStore>,
    last_persisted: Mutex<u64>,
    wake: Arc<Notify>,
}

impl TaskRegistry {
    /// An empty registry. Nothing is read from `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::restore(store, Vec::new())
    }

    /// A registry seeded with tasks restored from the previous session.
    pub fn restore(store: Arc<dyn KeyValueStore>, tasks: Vec<GenerationTask>) -> Self {
        let tasks = tasks
            .into_iter()
            .map(|task| (task.task_id.clone(), Slot { task, revision: 0 }))
            .collect();
        Self {
            inner: RwLock::new(Inner {
                tasks,
                generation: 0,
            }),
            store,
            last_persisted: Mutex::new(0),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Signalled whenever a task is added; the poller waits on it while idle.
    pub fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    pub async fn add(&self, task: GenerationTask) -> Result<(), DaemonError> {
        let (generation, snapshot) = {
            let mut inner = self.inner.write().await;
            if inner.tasks.contains_key(&task.task_id) {
                return Err(DaemonError::DuplicateTask(task.task_id));
            }
            tracing::info!(task_id = %task.task_id, "tracking task");
            let revision = inner.generation + 1;
            inner
                .tasks
                .insert(task.task_id.clone(), Slot { task, revision });
            inner.bump()
        };
        self.persist(generation, snapshot).await;
        self.wake.notify_one();
        Ok(())
    }

    /// Remove a task; `None` when it was not tracked (nothing is written).
    pub async fn remove(&self, task_id: &TaskId) -> Option<GenerationTask> {
        let (removed, generation, snapshot) = {
            let mut inner = self.inner.write().await;
            let removed = inner.tasks.shift_remove(task_id)?.task;
            let (generation, snapshot) = inner.bump();
            (removed, generation, snapshot)
        };
        tracing::info!(task_id = %task_id, status = %removed.status, "task removed");
        self.persist(generation, snapshot).await;
        Some(removed)
    }

    /// Merge a partial update. Returns `false` (and writes nothing) when absent.
    pub async fn update(&self, task_id: &TaskId, patch: TaskPatch) -> bool {
        let (generation, snapshot) = {
            let mut inner = self.inner.write().await;
            let revision = inner.generation + 1;
            let Some(slot) = inner.tasks.get_mut(task_id) else {
                return false;
            };
            slot.task.apply_patch(patch);
            slot.revision = revision;
            inner.bump()
        };
        self.persist(generation, snapshot).await;
        true
    }

    /// A task together with the revision to hand back to [`Self::replace_at`].
    pub(crate) async fn get_revision(&self, task_id: &TaskId) -> Option<(GenerationTask, u64)> {
        self.inner
            .read()
            .await
            .tasks
            .get(task_id)
            .map(|slot| (slot.task.clone(), slot.revision))
    }

    /// Swap in a whole task record, only if it is still tracked and has not
    /// changed since `revision` was read.
    pub(crate) async fn replace_at(&self, task: GenerationTask, revision: u64) -> Replace {
        let (generation, snapshot) = {
            let mut inner = self.inner.write().await;
            let next = inner.generation + 1;
            let Some(slot) = inner.tasks.get_mut(&task.task_id) else {
                return Replace::Missing;
            };
            if slot.revision != revision {
                return Replace::Stale;
            }
            slot.task = task;
            slot.revision = next;
            inner.bump()
        };
        self.persist(generation, snapshot).await;
        Replace::Replaced
    }

    pub async fn get(&self, task_id: &TaskId) -> Option<GenerationTask> {
        self.inner
            .read()
            .await
            .tasks
            .get(task_id)
            .map(|slot| slot.task.clone())
    }

    pub async fn contains(&self, task_id: &TaskId) -> bool {
        self.inner.read().await.tasks.contains_key(task_id)
    }

    /// All tracked tasks in insertion order, including retained failures.
    pub async fn snapshot(&self) -> Vec<GenerationTask> {
        self.inner
            .read()
            .await
            .tasks
            .values()
            .map(|slot| slot.task.clone())
            .collect()
    }

    /// Tasks the poller should query: everything not yet terminal.
    pub async fn pollable(&self) -> Vec<GenerationTask> {
        self.inner
            .read()
            .await
            .tasks
            .values()
            .filter(|slot| !slot.task.is_terminal())
            .map(|slot| slot.task.clone())
            .collect()
    }

    pub async fn has_pollable(&self) -> bool {
        self.inner
            .read()
            .await
            .tasks
            .values()
            .any(|slot| !slot.task.is_terminal())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.tasks.is_empty()
    }

    async fn persist(&self, generation: u64, tasks: Vec<GenerationTask>) {
        let mut last = self.last_persisted.lock().await;
        if generation <= *last {
            return;
        }
        if let Err(err) = snapshot::save_active_tasks(self.store.as_ref(), &tasks).await {
            tracing::error!(error = %err, "failed to persist active tasks; in-memory state kept");
        }
        *last = generation;
    }
}
