//! Snapshot persistence for per-client queue and history state.
//!
//! The session engine treats snapshots as a best-effort cache: the
//! gateway stays authoritative for in-flight work, so a lost or corrupt
//! snapshot degrades to an empty session instead of failing the
//! process. Values travel as JSON (image bytes inside history entries
//! are base64 text, encoded by their serde representation).

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

/// Errors from the snapshot layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A client id or key contained characters unsafe for a file path.
    #[error("Invalid storage key component: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Key-value snapshot storage scoped by client id.
///
/// Keys are short well-known names (`"jobs"`, `"history"`); values are
/// opaque JSON documents owned by the caller.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load a snapshot; `Ok(None)` when absent.
    async fn load(&self, client_id: &str, key: &str) -> Result<Option<Value>, StorageError>;

    /// Write a snapshot, replacing any previous value.
    async fn save(&self, client_id: &str, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Delete a snapshot; deleting a missing snapshot is not an error.
    async fn remove(&self, client_id: &str, key: &str) -> Result<(), StorageError>;
}

/// File-backed store: one JSON file per `(client_id, key)` under a
/// configured root directory.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `{root}/{client_id}/{key}.json`, rejecting components
    /// that could escape the root.
    fn path_for(&self, client_id: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_component(client_id)?;
        validate_component(key)?;
        Ok(self.root.join(client_id).join(format!("{key}.json")))
    }
}

/// Path components may only contain alphanumerics, `-` and `_`.
fn validate_component(component: &str) -> Result<(), StorageError> {
    let ok = !component.is_empty()
        && component
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(component.to_string()))
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn load(&self, client_id: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(client_id, key)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&text) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                // A corrupt snapshot is dropped rather than propagated;
                // the session starts fresh.
                tracing::warn!(path = %path.display(), error = %e, "Discarding corrupt snapshot");
                Ok(None)
            }
        }
    }

    async fn save(&self, client_id: &str, key: &str, value: &Value) -> Result<(), StorageError> {
        let path = self.path_for(client_id, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let text = serde_json::to_string(value)?;
        tokio::fs::write(&path, text).await?;
        Ok(())
    }

    async fn remove(&self, client_id: &str, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(client_id, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store used by tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<(String, String), Value>>,
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self, client_id: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.get(&(client_id.to_string(), key.to_string())).cloned())
    }

    async fn save(&self, client_id: &str, key: &str, value: &Value) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        inner.insert((client_id.to_string(), key.to_string()), value.clone());
        Ok(())
    }

    async fn remove(&self, client_id: &str, key: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        inner.remove(&(client_id.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store
            .save("client-1", "jobs", &json!([{"id": "a"}]))
            .await
            .unwrap();
        let loaded = store.load("client-1", "jobs").await.unwrap();
        assert_eq!(loaded, Some(json!([{"id": "a"}])));
    }

    #[tokio::test]
    async fn missing_snapshot_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load("client-1", "jobs").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_snapshot_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("client-1")).unwrap();
        std::fs::write(dir.path().join("client-1/jobs.json"), "{broken").unwrap();

        let store = JsonFileStore::new(dir.path());
        assert!(store.load("client-1", "jobs").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store.save("c", "history", &json!([1])).await.unwrap();
        store.save("c", "history", &json!([1, 2])).await.unwrap();
        assert_eq!(store.load("c", "history").await.unwrap(), Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store.save("c", "jobs", &json!([])).await.unwrap();
        store.remove("c", "jobs").await.unwrap();
        store.remove("c", "jobs").await.unwrap();
        assert!(store.load("c", "jobs").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn path_traversal_components_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        let err = store.load("../evil", "jobs").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        let err = store.save("c", "a/b", &json!(null)).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        let err = store.load("", "jobs").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::default();
        store.save("c", "jobs", &json!({"x": 1})).await.unwrap();
        assert_eq!(store.load("c", "jobs").await.unwrap(), Some(json!({"x": 1})));
        store.remove("c", "jobs").await.unwrap();
        assert!(store.load("c", "jobs").await.unwrap().is_none());
    }
}
