//! Locations of the daemon socket, config file and state directory under `~/.cadenza`.

use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "daemon.sock";
pub const CONFIG_FILE: &str = "config.yaml";

pub fn cadenza_root(home: &Path) -> PathBuf {
    home.join(".cadenza")
}

pub fn state_dir(home: &Path) -> PathBuf {
    cadenza_root(home).join("state")
}

pub fn socket_path(home: &Path) -> PathBuf {
    cadenza_root(home).join(DAEMON_SOCKET)
}

pub fn config_path(home: &Path) -> PathBuf {
    cadenza_root(home).join(CONFIG_FILE)
}
