use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A value as the backing map stores it: either text or an opaque blob.
/// Encrypted stores decide which shape they write; the backend does not
/// interpret either.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RawValue {
    Text(String),
    Blob(Vec<u8>),
}

impl RawValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            RawValue::Blob(_) => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            RawValue::Text(_) => None,
            RawValue::Blob(b) => Some(b),
        }
    }
}

/// Errors produced by backing-map implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Underlying storage failure.
    #[error("backend failure: {reason}")]
    Storage { reason: String },
}

/// Contract for the plain key-value map an encrypted store sits in front of.
/// The backend itself is not confidential; whatever lands here is readable
/// by anyone with access to the underlying storage.
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    /// Retrieve the value for a key, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<RawValue>, BackendError>;

    /// Persist a value under a key, overwriting any existing entry.
    async fn set(&self, key: &str, value: RawValue) -> Result<(), BackendError>;

    /// Remove a key and its value (idempotent).
    async fn remove(&self, key: &str) -> Result<(), BackendError>;

    /// Whether an entry exists for the key. Never inspects the value.
    async fn contains(&self, key: &str) -> Result<bool, BackendError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Enumerate all stored keys.
    async fn keys(&self) -> Result<Vec<String>, BackendError>;
}

/// In-memory backend for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    inner: Arc<Mutex<HashMap<String, RawValue>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<RawValue>, BackendError> {
        let map = self.inner.lock().map_err(|err| BackendError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: RawValue) -> Result<(), BackendError> {
        let mut map = self.inner.lock().map_err(|err| BackendError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        let mut map = self.inner.lock().map_err(|err| BackendError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, BackendError> {
        let map = self.inner.lock().map_err(|err| BackendError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(map.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_round_trip() {
        let backend = MemoryBackend::new();
        backend
            .set("k", RawValue::Blob(vec![1, 2, 3]))
            .await
            .expect("set");

        let value = backend.get("k").await.expect("get");
        assert_eq!(value, Some(RawValue::Blob(vec![1, 2, 3])));
        assert!(backend.contains("k").await.expect("contains"));
    }

    #[tokio::test]
    async fn overwrite_replaces_value() {
        let backend = MemoryBackend::new();
        backend
            .set("k", RawValue::Text("first".into()))
            .await
            .expect("set");
        backend
            .set("k", RawValue::Blob(vec![9]))
            .await
            .expect("overwrite");

        assert_eq!(
            backend.get("k").await.expect("get"),
            Some(RawValue::Blob(vec![9]))
        );
        assert_eq!(backend.keys().await.expect("keys"), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let backend = MemoryBackend::new();
        backend
            .set("k", RawValue::Text("v".into()))
            .await
            .expect("set");
        backend.remove("k").await.expect("remove");
        backend.remove("k").await.expect("remove again");

        assert!(!backend.contains("k").await.expect("contains"));
        assert!(backend.keys().await.expect("keys").is_empty());
    }
}
