//! Daemon configuration, read from `~/.cadenza/config.yaml`.
//!
//! Every field has a default, so a missing file or a partial file is fine:
//!
//! ```yaml
//! poll_interval_secs: 5
//! failure_policy: retain        # or: prune
//! provider:
//!   base_url: https://api.kie.ai/api/v1
//!   api_key_env: CADENZA_API_KEY
//!   callback_url: https://example.com/hooks/generation
//!   request_timeout_secs: 30
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, DaemonError};
use crate::paths::config_path;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_BASE_URL: &str = "https://api.kie.ai/api/v1";
pub const DEFAULT_API_KEY_ENV: &str = "CADENZA_API_KEY";

/// Overrides `provider.base_url` when set.
pub const BASE_URL_ENV: &str = "CADENZA_PROVIDER_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub poll_interval_secs: u64,
    pub failure_policy: FailurePolicy,
    pub provider: ProviderConfig,
}

/// What to do with a task once the provider reports a failure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep the failed task visible until it is removed explicitly.
    #[default]
    Retain,
    /// Remove the task as soon as the failure is applied.
    Prune,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
    pub callback_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            failure_policy: FailurePolicy::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            callback_url: None,
            request_timeout_secs: 30,
        }
    }
}

impl DaemonConfig {
    /// Load `<home>/.cadenza/config.yaml`, or defaults when it does not exist.
    pub fn load_at(home: &Path) -> Result<Self, DaemonError> {
        let path = config_path(home);
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            Self::from_yaml(&contents).map_err(|source| DaemonError::Config {
                path: path.clone(),
                source,
            })?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                config.provider.base_url = url.trim().to_string();
            }
        }
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Polling period; never shorter than one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl ProviderConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let home = TempDir::new().expect("home");
        let config = DaemonConfig::load_at(home.path()).expect("load");
        assert_eq!(config.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert_eq!(config.failure_policy, FailurePolicy::Retain);
        assert_eq!(config.provider.api_key_env, DEFAULT_API_KEY_ENV);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = DaemonConfig::from_yaml("failure_policy: prune\nprovider:\n  callback_url: https://hooks.example/cb\n")
            .expect("parse");
        assert_eq!(config.failure_policy, FailurePolicy::Prune);
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(
            config.provider.callback_url.as_deref(),
            Some("https://hooks.example/cb")
        );
    }

    #[test]
    fn zero_interval_is_clamped() {
        let config = DaemonConfig::from_yaml("poll_interval_secs: 0").expect("parse");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn malformed_yaml_reports_path() {
        let home = TempDir::new().expect("home");
        let path = config_path(home.path());
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "poll_interval_secs: [not, a, number]").expect("write");

        let err = DaemonConfig::load_at(home.path()).unwrap_err();
        assert!(matches!(err, DaemonError::Config { .. }), "got: {err}");
        assert!(err.to_string().contains("config.yaml"));
    }
}
