//! The permanent, id-deduplicated artifact collection.
//!
//! Append-only: artifacts are never edited or removed once merged.
//! Ordering is most-recent-first. Same write-through and generation
//! ordering as [`crate::registry::TaskRegistry`].

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use cadenza_core::{merge, Artifact, ArtifactId};
use cadenza_store::{snapshot, KeyValueStore};

struct Inner {
    artifacts: Vec<Artifact>,
    generation: u64,
}

pub struct ArtifactLibrary {
    inner: RwLock<Inner>,
    store: Arc<dyn KeyValueStore>,
    last_persisted: Mutex<u64>,
}

impl ArtifactLibrary {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::restore(store, Vec::new())
    }

    /// A library seeded with artifacts restored from the previous session.
    pub fn restore(store: Arc<dyn KeyValueStore>, artifacts: Vec<Artifact>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                artifacts,
                generation: 0,
            }),
            store,
            last_persisted: Mutex::new(0),
        }
    }

    /// Merge `candidates`, returning the ones that were new.
    pub async fn merge(&self, candidates: Vec<Artifact>) -> Vec<Artifact> {
        let (inserted, generation, snapshot) = {
            let mut inner = self.inner.write().await;
            let existing = std::mem::take(&mut inner.artifacts);
            let outcome = merge(existing, candidates);
            inner.artifacts = outcome.collection;
            if outcome.inserted.is_empty() {
                return outcome.inserted;
            }
            inner.generation += 1;
            (outcome.inserted, inner.generation, inner.artifacts.clone())
        };

        tracing::info!(
            inserted = inserted.len(),
            total = snapshot.len(),
            "artifact library updated",
        );
        self.persist(generation, snapshot).await;
        inserted
    }

    pub async fn snapshot(&self) -> Vec<Artifact> {
        self.inner.read().await.artifacts.clone()
    }

    pub async fn get(&self, id: &ArtifactId) -> Option<Artifact> {
        self.inner
            .read()
            .await
            .artifacts
            .iter()
            .find(|a| &a.id == id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.artifacts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.artifacts.is_empty()
    }

    async fn persist(&self, generation: u64, artifacts: Vec<Artifact>) {
        let mut last = self.last_persisted.lock().await;
        if generation <= *last {
            return;
        }
        if let Err(err) = snapshot::save_completed_artifacts(self.store.as_ref(), &artifacts).await
        {
            tracing::error!(error = %err, "failed to persist artifact library; in-memory state kept");
        }
        *last = generation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::TaskId;
    use async_trait::async_trait;
    use cadenza_store::{MemoryStore, PersistedState, StoreError, COMPLETED_ARTIFACTS_KEY};
    use chrono::Utc;

    fn artifact(id: &str) -> Artifact {
        Artifact {
            id: ArtifactId::from(id),
            title: id.to_uppercase(),
            prompt: String::new(),
            tags: String::new(),
            duration_secs: 60.0,
            audio_url: format!("https://cdn/{id}.mp3"),
            stream_audio_url: String::new(),
            image_url: String::new(),
            model_name: "V4".to_string(),
            created_at: Utc::now(),
            task_id: TaskId::from("t"),
        }
    }

    #[tokio::test]
    async fn merge_persists_and_survives_reload() {
        let store = Arc::new(MemoryStore::new());
        let library = ArtifactLibrary::new(store.clone());
        library.merge(vec![artifact("a1")]).await;
        let inserted = library.merge(vec![artifact("a2"), artifact("a1")]).await;
        assert_eq!(inserted.len(), 1);

        let state = PersistedState::load(store.as_ref()).await;
        let reloaded = ArtifactLibrary::restore(store, state.completed_artifacts);
        let ids: Vec<_> = reloaded.snapshot().await.into_iter().map(|a| a.id.0).collect();
        assert_eq!(ids, ["a2", "a1"]);
    }

    #[tokio::test]
    async fn duplicate_only_merge_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let library = ArtifactLibrary::new(store.clone());
        assert!(library.merge(Vec::new()).await.is_empty());
        assert!(!store.contains(COMPLETED_ARTIFACTS_KEY).await);
    }

    #[tokio::test]
    async fn get_finds_by_id() {
        let library = ArtifactLibrary::new(Arc::new(MemoryStore::new()));
        library.merge(vec![artifact("a1")]).await;
        assert_eq!(
            library.get(&ArtifactId::from("a1")).await.map(|a| a.title),
            Some("A1".to_string())
        );
        assert!(library.get(&ArtifactId::from("zz")).await.is_none());
    }

    struct ReadOnlyStore;

    #[async_trait]
    impl KeyValueStore for ReadOnlyStore {
        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        async fn set(&self, key: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::InvalidKey(key.to_string()))
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            Err(StoreError::InvalidKey(key.to_string()))
        }
    }

    #[tokio::test]
    async fn failed_write_keeps_merged_artifacts() {
        let library = ArtifactLibrary::new(Arc::new(ReadOnlyStore));
        let inserted = library.merge(vec![artifact("a1"), artifact("a2")]).await;
        assert_eq!(inserted.len(), 2);

        library.merge(vec![artifact("a3")]).await;
        let ids: Vec<_> = library.snapshot().await.into_iter().map(|a| a.id.0).collect();
        assert_eq!(ids, ["a3", "a1", "a2"]);
    }
}
