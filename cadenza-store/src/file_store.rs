//! File-backed key/value store.
//!
//! # Storage layout
//!
//! ```text
//! <dir>/                    (mode 0700, created on first write)
//!   <key>.json              (mode 0600)
//! ```
//!
//! Write flow: value → `<key>.json.tmp` sibling → `chmod 0600` → `rename`.
//! A crash mid-write leaves the previous value intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{io_err, StoreError};
use crate::kv::KeyValueStore;

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<key>.json`. No I/O.
    pub fn key_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.key_path(key)?;
        run_blocking(move || read_value(&path)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.key_path(key)?;
        let dir = self.dir.clone();
        let value = value.to_string();
        run_blocking(move || write_value(&dir, &path, &value)).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.key_path(key)?;
        run_blocking(move || remove_value(&path)).await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| StoreError::Worker(err.to_string()))?
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

fn read_value(path: &Path) -> Result<Option<String>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

fn write_value(dir: &Path, path: &Path, value: &str) -> Result<(), StoreError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        set_dir_permissions(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, value).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

fn remove_value(path: &Path) -> Result<(), StoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(path, err)),
    }
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("state"));
        assert_eq!(store.get("active-tasks").await.unwrap(), None);
    }

    #[tokio::test]
    async fn roundtrip_and_tmp_cleanup() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("state"));
        store.set("active-tasks", "[1,2,3]").await.unwrap();

        assert_eq!(
            store.get("active-tasks").await.unwrap().as_deref(),
            Some("[1,2,3]")
        );
        let tmp_path = store
            .key_path("active-tasks")
            .unwrap()
            .with_extension("json.tmp");
        assert!(!tmp_path.exists(), ".tmp must be gone after rename");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());
        store.set("k", "v").await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(!store.key_path("k").unwrap().exists());
    }

    #[tokio::test]
    async fn path_like_keys_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path());
        for key in ["", "../escape", "a/b", "dots.json"] {
            let err = store.set(key, "x").await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey(_)), "{key}: {err}");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn value_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("state"));
        store.set("k", "v").await.unwrap();
        let mode = std::fs::metadata(store.key_path("k").unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }
}
