//! The orchestrator owns the registry, the library, the poller and the
//! playback handoff, and is the only thing the runtime talks to.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use cadenza_core::{Artifact, ArtifactId, GenerationTask, SubmissionParams, TaskId, TaskPatch};
use cadenza_store::{KeyValueStore, PersistedState};

use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::events::{self, emit, OrchestratorEvent};
use crate::library::ArtifactLibrary;
use crate::playback::{AudioEngine, PlaybackHandoff};
use crate::poller::Poller;
use crate::provider::StatusProvider;
use crate::registry::TaskRegistry;

pub struct Orchestrator {
    registry: Arc<TaskRegistry>,
    library: Arc<ArtifactLibrary>,
    playback: PlaybackHandoff,
    events: broadcast::Sender<OrchestratorEvent>,
    shutdown: broadcast::Sender<()>,
    poller: Mutex<Option<JoinHandle<Result<(), DaemonError>>>>,
}

impl Orchestrator {
    /// Restore persisted state from `store` and start polling.
    pub async fn start(
        config: &DaemonConfig,
        store: Arc<dyn KeyValueStore>,
        provider: Arc<dyn StatusProvider>,
        engine: Arc<dyn AudioEngine>,
    ) -> Self {
        let state = PersistedState::load(store.as_ref()).await;
        let registry = Arc::new(TaskRegistry::restore(store.clone(), state.active_tasks));
        let library = Arc::new(ArtifactLibrary::restore(store, state.completed_artifacts));
        let events = events::channel();
        let (shutdown, _) = broadcast::channel::<()>(1);

        let poller = Poller::new(
            registry.clone(),
            library.clone(),
            provider,
            events.clone(),
            config.poll_interval(),
            config.failure_policy,
        );
        let handle = tokio::spawn(poller.run(shutdown.subscribe()));

        let active_tasks = registry.len().await;
        let library_len = library.len().await;
        tracing::info!(
            active_tasks = active_tasks,
            library = library_len,
            failure_policy = ?config.failure_policy,
            "orchestrator started",
        );

        Self {
            registry,
            library,
            playback: PlaybackHandoff::new(engine),
            events,
            shutdown,
            poller: Mutex::new(Some(handle)),
        }
    }

    /// Start tracking a freshly submitted task.
    pub async fn track(
        &self,
        task_id: TaskId,
        params: SubmissionParams,
    ) -> Result<GenerationTask, DaemonError> {
        let task = GenerationTask::new(task_id, params, Utc::now());
        self.add_task(task.clone()).await?;
        Ok(task)
    }

    pub async fn add_task(&self, task: GenerationTask) -> Result<(), DaemonError> {
        self.registry.add(task.clone()).await?;
        emit(&self.events, OrchestratorEvent::TaskUpdated { task });
        Ok(())
    }

    /// Stop tracking a task. A status response still in flight for it is
    /// discarded when it arrives.
    pub async fn remove_task(&self, task_id: &TaskId) -> Option<GenerationTask> {
        let removed = self.registry.remove(task_id).await?;
        emit(
            &self.events,
            OrchestratorEvent::TaskRemoved {
                task_id: task_id.clone(),
            },
        );
        Some(removed)
    }

    pub async fn update_task(&self, task_id: &TaskId, patch: TaskPatch) -> bool {
        if !self.registry.update(task_id, patch).await {
            return false;
        }
        if let Some(task) = self.registry.get(task_id).await {
            emit(&self.events, OrchestratorEvent::TaskUpdated { task });
        }
        true
    }

    pub async fn task(&self, task_id: &TaskId) -> Option<GenerationTask> {
        self.registry.get(task_id).await
    }

    pub async fn tasks(&self) -> Vec<GenerationTask> {
        self.registry.snapshot().await
    }

    pub async fn artifacts(&self) -> Vec<Artifact> {
        self.library.snapshot().await
    }

    /// Select an artifact by id and hand it to the audio engine. Library
    /// entries are searched first, then provisional artifacts of live tasks.
    pub async fn select_artifact(&self, artifact_id: &ArtifactId) -> Result<Artifact, DaemonError> {
        let artifact = match self.library.get(artifact_id).await {
            Some(artifact) => artifact,
            None => self
                .registry
                .snapshot()
                .await
                .into_iter()
                .flat_map(|task| task.provisional_artifacts)
                .find(|artifact| &artifact.id == artifact_id)
                .ok_or_else(|| DaemonError::UnknownArtifact(artifact_id.to_string()))?,
        };
        if !artifact.is_playable() {
            return Err(DaemonError::Playback(format!(
                "artifact {artifact_id} has no media URL"
            )));
        }
        // The engine call is fire-and-forget.
        drop(self.playback.select_artifact(artifact.clone()).await);
        Ok(artifact)
    }

    pub async fn clear_selection(&self) {
        drop(self.playback.clear_selection().await);
    }

    pub async fn current_selection(&self) -> Option<Artifact> {
        self.playback.current().await
    }

    pub fn playback(&self) -> &PlaybackHandoff {
        &self.playback
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    /// Stop the poller and wait for it. Safe to call more than once.
    pub async fn shutdown(&self) -> Result<(), DaemonError> {
        let Some(handle) = self.poller.lock().await.take() else {
            return Ok(());
        };
        let _ = self.shutdown.send(());
        match handle.await {
            Ok(result) => result,
            Err(err) => Err(DaemonError::Protocol(format!(
                "poller task join failure: {err}"
            ))),
        }
    }
}
