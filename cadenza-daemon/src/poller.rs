//! Periodic status polling.
//!
//! One timer drives everything. On each tick the pollable tasks are
//! snapshotted and one status query per task is pushed onto a
//! `FuturesUnordered`. Each resolved query is applied on its own spawned
//! task, so a slow persistence write for one task never holds up queries,
//! ticks or results for the others. While nothing is pollable the timer is
//! not polled at all and the loop parks on the registry's wake handle.
//!
//! A task stays pending from dispatch until its result has been applied,
//! and is skipped by any tick in between, so results for the same task are
//! always applied in tick order.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use cadenza_core::{transition, Artifact, StatusPayload, TaskId, TaskStatus, Transition};

use crate::config::FailurePolicy;
use crate::error::{DaemonError, ProviderError};
use crate::events::{emit, OrchestratorEvent};
use crate::library::ArtifactLibrary;
use crate::provider::StatusProvider;
use crate::registry::{Replace, TaskRegistry};

type StatusFuture =
    Pin<Box<dyn Future<Output = (TaskId, Result<StatusPayload, ProviderError>)> + Send>>;
type ApplyFuture = Pin<Box<dyn Future<Output = TaskId> + Send>>;

pub struct Poller {
    registry: Arc<TaskRegistry>,
    library: Arc<ArtifactLibrary>,
    provider: Arc<dyn StatusProvider>,
    events: broadcast::Sender<OrchestratorEvent>,
    interval: Duration,
    failure_policy: FailurePolicy,
}

impl Poller {
    pub fn new(
        registry: Arc<TaskRegistry>,
        library: Arc<ArtifactLibrary>,
        provider: Arc<dyn StatusProvider>,
        events: broadcast::Sender<OrchestratorEvent>,
        interval: Duration,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            registry,
            library,
            provider,
            events,
            interval,
            failure_policy,
        }
    }

    /// Poll until `shutdown` fires. Queries still in flight are dropped;
    /// results already being applied are allowed to finish.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), DaemonError> {
        let this = Arc::new(self);
        let wake = this.registry.wake_handle();
        let mut ticker = tokio::time::interval(this.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First poll one full interval after work appears, not immediately.
        ticker.reset();

        let mut in_flight: FuturesUnordered<StatusFuture> = FuturesUnordered::new();
        let mut applying: FuturesUnordered<ApplyFuture> = FuturesUnordered::new();
        let mut pending: HashSet<TaskId> = HashSet::new();

        tracing::info!(interval_secs = this.interval.as_secs(), "poller started");

        loop {
            let idle = !this.registry.has_pollable().await;
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = wake.notified(), if idle => {
                    ticker.reset();
                }
                _ = ticker.tick(), if !idle => {
                    this.dispatch(&mut in_flight, &mut pending).await;
                }
                Some((task_id, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    applying.push(this.spawn_apply(task_id, result));
                }
                Some(task_id) = applying.next(), if !applying.is_empty() => {
                    pending.remove(&task_id);
                }
            }
        }

        if !in_flight.is_empty() {
            tracing::debug!(
                outstanding = in_flight.len(),
                "poller stopping with status queries in flight"
            );
        }
        while applying.next().await.is_some() {}
        tracing::info!("poller stopped");
        Ok(())
    }

    async fn dispatch(
        &self,
        in_flight: &mut FuturesUnordered<StatusFuture>,
        pending: &mut HashSet<TaskId>,
    ) {
        let snapshot = self.registry.pollable().await;
        tracing::debug!(tasks = snapshot.len(), "poll tick");

        for task in snapshot {
            if !pending.insert(task.task_id.clone()) {
                tracing::debug!(task_id = %task.task_id, "previous status query still pending");
                continue;
            }
            let provider = self.provider.clone();
            let task_id = task.task_id;
            in_flight.push(Box::pin(async move {
                let result = provider.get_status(&task_id).await;
                (task_id, result)
            }));
        }
    }

    fn spawn_apply(
        self: &Arc<Self>,
        task_id: TaskId,
        result: Result<StatusPayload, ProviderError>,
    ) -> ApplyFuture {
        let poller = self.clone();
        let id = task_id.clone();
        let handle = tokio::spawn(async move { poller.apply_result(id, result).await });
        Box::pin(async move {
            if let Err(err) = handle.await {
                tracing::error!(task_id = %task_id, error = %err, "status apply task failed");
            }
            task_id
        })
    }

    /// Merge one status result into the registry and library.
    ///
    /// The transition is computed against a specific revision of the task.
    /// If the task is changed underneath (an `update_task` patch landing
    /// first), the result is re-applied to the fresh record.
    pub(crate) async fn apply_result(
        &self,
        task_id: TaskId,
        result: Result<StatusPayload, ProviderError>,
    ) {
        let payload = match result {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(task_id = %task_id, error = %err, "status query failed; task left unchanged");
                return;
            }
        };

        loop {
            let Some((current, revision)) = self.registry.get_revision(&task_id).await else {
                tracing::debug!(task_id = %task_id, "discarding status for task no longer tracked");
                return;
            };

            let Transition {
                task,
                library_candidates,
                newly_completed,
            } = transition::apply(&current, &payload, Utc::now());
            if task == current {
                return;
            }

            if task.status == TaskStatus::Success {
                self.complete(task_id, library_candidates, newly_completed)
                    .await;
                return;
            }

            if task.status.is_failure() && self.failure_policy == FailurePolicy::Prune {
                let message = task.error.clone().unwrap_or_default();
                if self.registry.remove(&task_id).await.is_some() {
                    tracing::warn!(task_id = %task_id, status = %task.status, "generation failed");
                    emit(&self.events, OrchestratorEvent::TaskFailed { task_id, message });
                }
                return;
            }

            match self.registry.replace_at(task.clone(), revision).await {
                Replace::Replaced => {}
                Replace::Missing => {
                    tracing::debug!(task_id = %task_id, "discarding status for task no longer tracked");
                    return;
                }
                Replace::Stale => {
                    tracing::debug!(task_id = %task_id, "task changed while applying status; retrying");
                    continue;
                }
            }

            if let TaskStatus::Other(raw) = &task.status {
                tracing::warn!(task_id = %task_id, status = %raw, "unrecognized task status recorded");
            }
            if task.status.is_failure() {
                let message = task.error.clone().unwrap_or_default();
                tracing::warn!(task_id = %task_id, status = %task.status, "generation failed");
                emit(&self.events, OrchestratorEvent::TaskFailed { task_id, message });
            } else {
                tracing::debug!(
                    task_id = %task_id,
                    status = %task.status,
                    progress = task.progress,
                    "task progressed",
                );
                emit(&self.events, OrchestratorEvent::TaskUpdated { task });
            }
            return;
        }
    }

    async fn complete(
        &self,
        task_id: TaskId,
        library_candidates: Vec<Artifact>,
        newly_completed: Vec<Artifact>,
    ) {
        if !library_candidates.is_empty() {
            self.library.merge(library_candidates).await;
        }
        if self.registry.remove(&task_id).await.is_none() {
            tracing::debug!(task_id = %task_id, "task removed before completion was recorded");
            return;
        }
        tracing::info!(
            task_id = %task_id,
            artifacts = newly_completed.len(),
            "generation complete",
        );
        emit(
            &self.events,
            OrchestratorEvent::TaskCompleted {
                task_id,
                artifacts: newly_completed,
            },
        );
    }
}
