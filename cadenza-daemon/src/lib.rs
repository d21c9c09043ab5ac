//! Cadenza daemon: task registry, artifact library, status poller, playback
//! handoff and the Unix-socket control server around them.

pub mod config;
mod error;
pub mod events;
pub mod library;
pub mod orchestrator;
pub mod paths;
pub mod playback;
pub mod poller;
pub mod protocol;
pub mod provider;
pub mod registry;
mod runtime;

pub use config::{DaemonConfig, FailurePolicy, ProviderConfig};
pub use error::{DaemonError, ProviderError};
pub use events::OrchestratorEvent;
pub use library::ArtifactLibrary;
pub use orchestrator::Orchestrator;
pub use playback::{AudioEngine, LoggingAudioEngine, PlaybackHandoff};
pub use poller::Poller;
pub use protocol::{
    request_library, request_play, request_remove, request_status, request_stop,
    request_stop_playback, request_tasks, request_track, send_request, DaemonRequest,
    DaemonResponse,
};
pub use provider::{GenerationRequest, HttpProvider, StatusProvider, Submitter};
pub use registry::TaskRegistry;
pub use runtime::{run, run_with, start_blocking};
