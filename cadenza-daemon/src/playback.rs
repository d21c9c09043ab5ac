//! Hands the selected artifact to an external audio engine.
//!
//! The selection is orchestrator state; the engine is fire-and-forget.
//! Engine failures are logged and never roll the selection back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use cadenza_core::Artifact;

use crate::error::DaemonError;

#[async_trait]
pub trait AudioEngine: Send + Sync {
    async fn play(&self, artifact: &Artifact) -> Result<(), DaemonError>;
    async fn pause(&self) -> Result<(), DaemonError>;
    async fn stop(&self) -> Result<(), DaemonError>;
    async fn seek(&self, position: Duration) -> Result<(), DaemonError>;
}

/// Engine that only records requests in the log. Used by the daemon when no
/// audio output is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAudioEngine;

#[async_trait]
impl AudioEngine for LoggingAudioEngine {
    async fn play(&self, artifact: &Artifact) -> Result<(), DaemonError> {
        let url = artifact.playback_url().ok_or_else(|| {
            DaemonError::Playback(format!("artifact {} has no media URL", artifact.id))
        })?;
        tracing::info!(artifact_id = %artifact.id, title = %artifact.title, url, "play");
        Ok(())
    }

    async fn pause(&self) -> Result<(), DaemonError> {
        tracing::info!("pause");
        Ok(())
    }

    async fn stop(&self) -> Result<(), DaemonError> {
        tracing::info!("stop playback");
        Ok(())
    }

    async fn seek(&self, position: Duration) -> Result<(), DaemonError> {
        tracing::info!(position_ms = position.as_millis() as u64, "seek");
        Ok(())
    }
}

#[derive(Clone)]
pub struct PlaybackHandoff {
    current: Arc<RwLock<Option<Artifact>>>,
    engine: Arc<dyn AudioEngine>,
}

impl PlaybackHandoff {
    pub fn new(engine: Arc<dyn AudioEngine>) -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
            engine,
        }
    }

    /// Record `artifact` as selected and ask the engine to start it.
    ///
    /// The selection is visible through [`Self::current`] before this returns;
    /// the engine call runs on the returned task.
    pub async fn select_artifact(&self, artifact: Artifact) -> JoinHandle<()> {
        *self.current.write().await = Some(artifact.clone());
        let engine = self.engine.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.play(&artifact).await {
                tracing::warn!(artifact_id = %artifact.id, error = %err, "audio engine failed to play");
            }
        })
    }

    pub async fn clear_selection(&self) -> JoinHandle<()> {
        *self.current.write().await = None;
        let engine = self.engine.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.stop().await {
                tracing::warn!(error = %err, "audio engine failed to stop");
            }
        })
    }

    pub async fn current(&self) -> Option<Artifact> {
        self.current.read().await.clone()
    }

    pub async fn pause(&self) {
        if let Err(err) = self.engine.pause().await {
            tracing::warn!(error = %err, "audio engine failed to pause");
        }
    }

    pub async fn seek(&self, position: Duration) {
        if let Err(err) = self.engine.seek(position).await {
            tracing::warn!(error = %err, "audio engine failed to seek");
        }
    }
}
