//! Cadenza core library: domain types, provider payloads, the task state
//! transition function, and the artifact deduplicating merge.
//!
//! Everything in this crate is pure: no I/O, no clocks, no logging.
//! - [`types`]: newtypes and domain structs
//! - [`payload`]: provider status payload decoding
//! - [`transition`]: `(task, payload) → (task', artifacts)`
//! - [`dedup`]: id-keyed, first-write-wins artifact merge
//! - [`error`]: [`CoreError`]

pub mod dedup;
pub mod error;
pub mod payload;
pub mod transition;
pub mod types;

pub use dedup::{merge, MergeOutcome};
pub use error::CoreError;
pub use payload::{MediaDescriptor, StatusPayload};
pub use transition::{apply, Transition};
pub use types::{Artifact, ArtifactId, GenerationTask, SubmissionParams, TaskId, TaskPatch, TaskStatus};
