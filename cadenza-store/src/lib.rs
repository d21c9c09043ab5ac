//! # cadenza-store
//!
//! Key/value persistence for orchestrator bookkeeping.
//!
//! [`KeyValueStore`] is the collaborator seam; [`FileStore`] keeps one
//! atomically written JSON file per key and [`MemoryStore`] backs tests.
//! [`snapshot`] encodes the two orchestrator keys and applies the
//! crash-recovery filter on load.

pub mod error;
pub mod file_store;
pub mod kv;
pub mod snapshot;

pub use error::StoreError;
pub use file_store::FileStore;
pub use kv::{KeyValueStore, MemoryStore};
pub use snapshot::{PersistedState, ACTIVE_TASKS_KEY, COMPLETED_ARTIFACTS_KEY};
