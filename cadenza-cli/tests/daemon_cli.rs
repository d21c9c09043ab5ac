use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn cadenza_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("cadenza"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("CADENZA_API_KEY", "test-key")
        // Nothing listens here; polls fail and are logged.
        .env("CADENZA_PROVIDER_URL", "http://127.0.0.1:9")
        .env_remove("RUST_LOG");
    cmd
}

struct DaemonProcess {
    child: Child,
    home: PathBuf,
}

impl DaemonProcess {
    fn start(home: &Path) -> Self {
        let child = cadenza_cmd(home)
            .args(["daemon", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");
        Self {
            child,
            home: home.to_path_buf(),
        }
    }

    fn stop(&mut self) {
        let _ = cadenza_cmd(&self.home).args(["daemon", "stop"]).status();

        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            sleep(Duration::from_millis(50));
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

fn daemon_running(home: &Path) -> bool {
    let Ok(output) = cadenza_cmd(home).args(["daemon", "status"]).output() else {
        return false;
    };
    serde_json::from_slice::<serde_json::Value>(&output.stdout)
        .ok()
        .and_then(|value| value.get("running").and_then(|v| v.as_bool()))
        .unwrap_or(false)
}

#[test]
fn status_without_daemon_reports_not_running() {
    let home = TempDir::new().expect("home");
    cadenza_cmd(home.path())
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(contains("\"running\": false"));
}

#[test]
fn stop_without_daemon_is_not_an_error() {
    let home = TempDir::new().expect("home");
    cadenza_cmd(home.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(contains("daemon is not running"));
}

#[test]
fn listing_tasks_needs_a_daemon() {
    let home = TempDir::new().expect("home");
    cadenza_cmd(home.path())
        .args(["tasks"])
        .assert()
        .failure()
        .stderr(contains("daemon is not running"));
}

#[test]
fn submit_requires_a_callback_url() {
    let home = TempDir::new().expect("home");
    cadenza_cmd(home.path())
        .args(["submit", "--prompt", "calm piano"])
        .assert()
        .failure()
        .stderr(contains("callback_url"));
}

#[test]
fn submit_rejects_overlong_simple_prompt_before_contacting_provider() {
    let home = TempDir::new().expect("home");
    let config_dir = home.path().join(".cadenza");
    fs::create_dir_all(&config_dir).expect("config dir");
    fs::write(
        config_dir.join("config.yaml"),
        "provider:\n  callback_url: https://hooks.example/cb\n",
    )
    .expect("write config");

    cadenza_cmd(home.path())
        .args(["submit", "--prompt", &"x".repeat(501)])
        .assert()
        .failure()
        .stderr(contains("500 characters"));
}

#[test]
fn track_list_remove_through_running_daemon() {
    let home = TempDir::new().expect("home");
    let mut daemon = DaemonProcess::start(home.path());
    assert!(
        wait_until(Duration::from_secs(10), || daemon_running(home.path())),
        "daemon did not come up"
    );

    cadenza_cmd(home.path())
        .args(["track", "task-42", "--prompt", "sea shanty", "--model", "V4"])
        .assert()
        .success()
        .stdout(contains("tracking task-42"));

    let output = cadenza_cmd(home.path())
        .args(["tasks", "--json"])
        .output()
        .expect("tasks");
    assert!(output.status.success());
    let tasks: serde_json::Value = serde_json::from_slice(&output.stdout).expect("tasks json");
    assert_eq!(tasks[0]["taskId"], "task-42");
    assert_eq!(tasks[0]["status"], "PENDING");

    cadenza_cmd(home.path())
        .args(["remove", "task-42"])
        .assert()
        .success();
    cadenza_cmd(home.path())
        .args(["tasks"])
        .assert()
        .success()
        .stdout(contains("No tasks in flight."));

    cadenza_cmd(home.path())
        .args(["library", "--json"])
        .assert()
        .success()
        .stdout(contains("[]"));

    daemon.stop();
    assert!(!home.path().join(".cadenza/daemon.sock").exists());
}
