use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by secure key storage implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretStoreError {
    /// Underlying secure storage failure.
    #[error("secure storage failure: {reason}")]
    Storage { reason: String },
}

/// Contract for durable secret storage (OS keychain in production; memory in
/// tests). Values survive process restarts and are assumed inaccessible
/// outside this application's trust boundary. There is no fallback when the
/// store is unreachable; callers treat failures as fatal.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Retrieve the secret stored under `name`, or `None` if absent.
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, SecretStoreError>;

    /// Create or replace the secret stored under `name`.
    async fn set(&self, name: &str, value: &[u8]) -> Result<(), SecretStoreError>;

    /// Remove the secret stored under `name` (idempotent).
    async fn remove(&self, name: &str) -> Result<(), SecretStoreError>;
}

/// In-memory secret store for tests and ephemeral sessions. Secrets do not
/// survive the process; never use outside tests.
#[derive(Debug, Default, Clone)]
pub struct MemorySecretStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, SecretStoreError> {
        let map = self.inner.lock().map_err(|err| SecretStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(map.get(name).cloned())
    }

    async fn set(&self, name: &str, value: &[u8]) -> Result<(), SecretStoreError> {
        let mut map = self.inner.lock().map_err(|err| SecretStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.insert(name.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), SecretStoreError> {
        let mut map = self.inner.lock().map_err(|err| SecretStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let store = MemorySecretStore::new();
        store.set("alias", b"secret-bytes").await.expect("set");

        let value = store.get("alias").await.expect("get");
        assert_eq!(value, Some(b"secret-bytes".to_vec()));
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = MemorySecretStore::new();
        assert_eq!(store.get("absent").await.expect("get"), None);
    }

    #[tokio::test]
    async fn remove_clears_secret() {
        let store = MemorySecretStore::new();
        store.set("alias", b"v").await.expect("set");
        store.remove("alias").await.expect("remove");
        store.remove("alias").await.expect("remove again");

        assert_eq!(store.get("alias").await.expect("get"), None);
    }
}
