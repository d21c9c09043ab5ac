use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use cadenza_core::{ArtifactId, SubmissionParams, TaskId};
use cadenza_store::FileStore;

use crate::config::DaemonConfig;
use crate::error::{io_err, DaemonError};
use crate::events::OrchestratorEvent;
use crate::orchestrator::Orchestrator;
use crate::paths::{cadenza_root, socket_path, state_dir};
use crate::playback::{AudioEngine, LoggingAudioEngine};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::provider::{HttpProvider, StatusProvider};

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon with the HTTP provider and the logging audio engine.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let config = DaemonConfig::load_at(&home)?;
    let provider = HttpProvider::from_config(&config.provider)?;
    tracing::info!(base_url = %config.provider.base_url, "using generation provider");
    run_with(home, config, Arc::new(provider), Arc::new(LoggingAudioEngine)).await
}

/// Run the daemon with explicit collaborators.
pub async fn run_with(
    home: PathBuf,
    config: DaemonConfig,
    provider: Arc<dyn StatusProvider>,
    engine: Arc<dyn AudioEngine>,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let store = Arc::new(FileStore::new(state_dir(&home)));
    let orchestrator = Arc::new(Orchestrator::start(&config, store, provider, engine).await);
    let started_at_unix = unix_seconds_now();

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                orchestrator,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let events_handle = {
        let shutdown = shutdown_tx.clone();
        let events = orchestrator.subscribe();
        tokio::spawn(async move { event_log_task(events, shutdown.subscribe()).await })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (socket_result, events_result, signal_result) =
        tokio::join!(socket_handle, events_handle, signal_handle);

    let poller_result = orchestrator.shutdown().await;

    handle_join("socket_server", socket_result)?;
    handle_join("event_log", events_result)?;
    handle_join("signal_handler", signal_result)?;
    poller_result
}

async fn socket_server_task(
    home: PathBuf,
    orchestrator: Arc<Orchestrator>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let orchestrator = orchestrator.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        orchestrator,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    orchestrator: Arc<Orchestrator>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stop = request.cmd == "stop";
        let response = if stop {
            let _ = shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        } else {
            handle_request(&home, &orchestrator, request, started_at_unix).await
        };

        write_response(&mut writer, &response).await?;
        if stop {
            break;
        }
    }

    Ok(())
}

/// Answer every command except `stop`, which needs the shutdown channel.
async fn handle_request(
    home: &Path,
    orchestrator: &Orchestrator,
    request: DaemonRequest,
    started_at_unix: u64,
) -> DaemonResponse {
    match execute(home, orchestrator, request, started_at_unix).await {
        Ok(data) => DaemonResponse::ok(data),
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

async fn execute(
    home: &Path,
    orchestrator: &Orchestrator,
    request: DaemonRequest,
    started_at_unix: u64,
) -> Result<Value, DaemonError> {
    match request.cmd.as_str() {
        "status" => Ok(build_status_payload(home, orchestrator, started_at_unix).await),
        "track" => {
            let task_id = TaskId::parse(required(&request.task_id, "taskId")?)?;
            let params = SubmissionParams {
                prompt: required(&request.prompt, "prompt")?.to_string(),
                model: required(&request.model, "model")?.to_string(),
            };
            let task = orchestrator.track(task_id, params).await?;
            Ok(json!(task))
        }
        "remove" => {
            let task_id = TaskId::parse(required(&request.task_id, "taskId")?)?;
            match orchestrator.remove_task(&task_id).await {
                Some(task) => Ok(json!(task)),
                None => Err(DaemonError::Protocol(format!(
                    "task {task_id} is not being tracked"
                ))),
            }
        }
        "tasks" => Ok(json!(orchestrator.tasks().await)),
        "library" => Ok(json!(orchestrator.artifacts().await)),
        "play" => {
            let artifact_id = ArtifactId::from(required(&request.artifact_id, "artifactId")?);
            let artifact = orchestrator.select_artifact(&artifact_id).await?;
            Ok(json!(artifact))
        }
        "stop-playback" => {
            orchestrator.clear_selection().await;
            Ok(json!({ "stopped": true }))
        }
        other => Err(DaemonError::Protocol(format!("unknown command '{other}'"))),
    }
}

fn required<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str, DaemonError> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| DaemonError::Protocol(format!("missing required field '{name}'")))
}

async fn build_status_payload(
    home: &Path,
    orchestrator: &Orchestrator,
    started_at_unix: u64,
) -> Value {
    let tasks = orchestrator.tasks().await;
    let polling = tasks.iter().filter(|t| !t.is_terminal()).count();
    let selection = orchestrator
        .current_selection()
        .await
        .map(|artifact| artifact.id.0);

    json!({
        "running": true,
        "pid": std::process::id(),
        "startedAtUnix": started_at_unix,
        "uptimeSecs": unix_seconds_now().saturating_sub(started_at_unix),
        "socket": socket_path(home).display().to_string(),
        "activeTasks": tasks.len(),
        "pollingTasks": polling,
        "libraryArtifacts": orchestrator.artifacts().await.len(),
        "selectedArtifact": selection,
    })
}

async fn event_log_task(
    mut events: broadcast::Receiver<OrchestratorEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = events.recv() => match event {
                Ok(OrchestratorEvent::TaskCompleted { task_id, artifacts }) => {
                    for artifact in &artifacts {
                        tracing::info!(
                            task_id = %task_id,
                            artifact_id = %artifact.id,
                            title = %artifact.title,
                            "artifact ready",
                        );
                    }
                }
                Ok(OrchestratorEvent::TaskFailed { task_id, message }) => {
                    tracing::warn!(task_id = %task_id, message = %message, "task failed");
                }
                Ok(OrchestratorEvent::TaskRemoved { task_id }) => {
                    tracing::info!(task_id = %task_id, "task no longer tracked");
                }
                Ok(OrchestratorEvent::TaskUpdated { task }) => {
                    tracing::debug!(
                        task_id = %task.task_id,
                        status = %task.status,
                        progress = task.progress,
                        "task updated",
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [cadenza_root(home), state_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
        set_private_dir_permissions(&dir)?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Set to `json` for one JSON object per log line.
pub const LOG_FORMAT_ENV: &str = "CADENZA_LOG_FORMAT";

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|format| format.eq_ignore_ascii_case("json"));
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(unix)]
fn set_private_dir_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_private_dir_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cadenza_core::StatusPayload;
    use cadenza_store::MemoryStore;
    use tempfile::TempDir;

    use crate::error::ProviderError;

    struct AlwaysPending;

    #[async_trait]
    impl StatusProvider for AlwaysPending {
        async fn get_status(&self, _: &TaskId) -> Result<StatusPayload, ProviderError> {
            Ok(StatusPayload::status_only("PENDING"))
        }
    }

    async fn orchestrator() -> Orchestrator {
        Orchestrator::start(
            &DaemonConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(AlwaysPending),
            Arc::new(LoggingAudioEngine),
        )
        .await
    }

    fn request(cmd: &str) -> DaemonRequest {
        DaemonRequest::command(cmd)
    }

    #[tokio::test]
    async fn track_then_list_then_remove() {
        let home = TempDir::new().unwrap();
        let orchestrator = orchestrator().await;

        let track = DaemonRequest {
            task_id: Some("t1".to_string()),
            prompt: Some("lofi beats".to_string()),
            model: Some("V4".to_string()),
            ..request("track")
        };
        let response = handle_request(home.path(), &orchestrator, track.clone(), 0).await;
        assert!(response.ok, "{:?}", response.error);
        assert_eq!(response.data.as_ref().unwrap()["status"], "PENDING");

        let duplicate = handle_request(home.path(), &orchestrator, track, 0).await;
        assert!(!duplicate.ok);

        let tasks = handle_request(home.path(), &orchestrator, request("tasks"), 0).await;
        assert_eq!(tasks.data.unwrap().as_array().map(Vec::len), Some(1));

        let remove = DaemonRequest {
            task_id: Some("t1".to_string()),
            ..request("remove")
        };
        assert!(handle_request(home.path(), &orchestrator, remove.clone(), 0).await.ok);
        let again = handle_request(home.path(), &orchestrator, remove, 0).await;
        assert!(again.error.unwrap().contains("not being tracked"));

        orchestrator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn track_requires_fields() {
        let home = TempDir::new().unwrap();
        let orchestrator = orchestrator().await;
        let response = handle_request(
            home.path(),
            &orchestrator,
            DaemonRequest {
                task_id: Some("t1".to_string()),
                ..request("track")
            },
            0,
        )
        .await;
        assert!(response.error.unwrap().contains("prompt"));
        orchestrator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn play_unknown_artifact_and_unknown_command_are_errors() {
        let home = TempDir::new().unwrap();
        let orchestrator = orchestrator().await;

        let play = DaemonRequest {
            artifact_id: Some("missing".to_string()),
            ..request("play")
        };
        let response = handle_request(home.path(), &orchestrator, play, 0).await;
        assert!(response.error.unwrap().contains("missing"));

        let response = handle_request(home.path(), &orchestrator, request("dance"), 0).await;
        assert_eq!(response.error.as_deref(), Some("daemon protocol error: unknown command 'dance'"));
        orchestrator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn status_payload_reports_counts() {
        let home = TempDir::new().unwrap();
        let orchestrator = orchestrator().await;
        orchestrator
            .track(
                TaskId::from("t1"),
                SubmissionParams {
                    prompt: "p".to_string(),
                    model: "V4".to_string(),
                },
            )
            .await
            .unwrap();

        let status = build_status_payload(home.path(), &orchestrator, unix_seconds_now()).await;
        assert_eq!(status["running"], true);
        assert_eq!(status["activeTasks"], 1);
        assert_eq!(status["pollingTasks"], 1);
        assert_eq!(status["libraryArtifacts"], 0);
        assert!(status["selectedArtifact"].is_null());
        orchestrator.shutdown().await.unwrap();
    }

    #[test]
    fn stale_socket_file_is_removed_before_bind() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("daemon.sock");
        fs::write(&socket, b"").unwrap();
        prepare_socket_for_bind(&socket).expect("stale socket cleared");
        assert!(!socket.exists());
    }
}
