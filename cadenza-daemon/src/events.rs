//! Orchestrator events, broadcast to any number of subscribers.

use serde::Serialize;
use tokio::sync::broadcast;

use cadenza_core::{Artifact, GenerationTask, TaskId};

pub const EVENT_CAPACITY: usize = 64;

/// Broadcast whenever the orchestrator's observable state changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    TaskUpdated {
        task: GenerationTask,
    },
    /// The task reached `SUCCESS`. `artifacts` are the newly completed,
    /// playable ones.
    TaskCompleted {
        task_id: TaskId,
        artifacts: Vec<Artifact>,
    },
    TaskFailed {
        task_id: TaskId,
        message: String,
    },
    TaskRemoved {
        task_id: TaskId,
    },
}

pub fn channel() -> broadcast::Sender<OrchestratorEvent> {
    broadcast::channel(EVENT_CAPACITY).0
}

/// Send without caring whether anyone is subscribed.
pub(crate) fn emit(events: &broadcast::Sender<OrchestratorEvent>, event: OrchestratorEvent) {
    let _ = events.send(event);
}
