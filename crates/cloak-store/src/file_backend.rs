//! Durable backing map: a JSON snapshot on disk, replaced atomically on
//! every mutation. The file is ordinary, non-confidential storage; the
//! encrypted stores layered on top are what keep its contents opaque.

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{Read, Write},
    path::PathBuf,
    sync::Mutex,
};

use async_trait::async_trait;
use cloak_core::backend::{BackendError, RawValue, SettingsBackend};
use tempfile::NamedTempFile;

pub struct JsonFileBackend {
    path: PathBuf,
    map: Mutex<HashMap<String, RawValue>>,
}

impl JsonFileBackend {
    /// Open the backend at `path`, loading the existing snapshot if there
    /// is one.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let path = path.into();
        let map = match File::open(&path) {
            Ok(mut file) => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf).map_err(storage_err)?;
                serde_json::from_slice(&buf).map_err(storage_err)?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(storage_err(err)),
        };
        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    fn persist(&self, map: &HashMap<String, RawValue>) -> Result<(), BackendError> {
        let parent = self.path.parent().ok_or_else(|| BackendError::Storage {
            reason: "invalid storage path".to_string(),
        })?;
        fs::create_dir_all(parent).map_err(storage_err)?;

        let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
        let json = serde_json::to_vec(map).map_err(storage_err)?;
        tmp.write_all(&json).map_err(storage_err)?;
        tmp.flush().map_err(storage_err)?;
        tmp.persist(&self.path).map_err(|err| storage_err(err.error))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, RawValue>>, BackendError> {
        self.map.lock().map_err(|err| BackendError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl SettingsBackend for JsonFileBackend {
    async fn get(&self, key: &str) -> Result<Option<RawValue>, BackendError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: RawValue) -> Result<(), BackendError> {
        let mut map = self.lock()?;
        map.insert(key.to_string(), value);
        self.persist(&map)
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        let mut map = self.lock()?;
        if map.remove(key).is_some() {
            self.persist(&map)?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

fn storage_err<E: ToString>(err: E) -> BackendError {
    BackendError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use cloak_core::{
        secrets::MemorySecretStore,
        vault::{ReadPolicy, SettingsVault},
    };

    use super::*;
    use crate::{aead::AesAead, key_provider::StoredKeyProvider, sealed::SealedStore};

    #[tokio::test]
    async fn starts_empty_when_file_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = JsonFileBackend::open(dir.path().join("settings.json")).expect("open");
        assert!(backend.keys().await.expect("keys").is_empty());
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");

        let backend = JsonFileBackend::open(&path).expect("open");
        backend
            .set("k", RawValue::Blob(vec![1, 2, 3]))
            .await
            .expect("set");
        backend
            .set("t", RawValue::Text("armored".into()))
            .await
            .expect("set");
        drop(backend);

        let reopened = JsonFileBackend::open(&path).expect("reopen");
        assert_eq!(
            reopened.get("k").await.expect("get"),
            Some(RawValue::Blob(vec![1, 2, 3]))
        );
        assert_eq!(
            reopened.get("t").await.expect("get"),
            Some(RawValue::Text("armored".into()))
        );
    }

    #[tokio::test]
    async fn remove_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");

        let backend = JsonFileBackend::open(&path).expect("open");
        backend
            .set("k", RawValue::Text("v".into()))
            .await
            .expect("set");
        backend.remove("k").await.expect("remove");
        drop(backend);

        let reopened = JsonFileBackend::open(&path).expect("reopen");
        assert_eq!(reopened.get("k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn sealed_store_leaves_no_plaintext_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        let secrets = MemorySecretStore::new();

        {
            let keys = StoredKeyProvider::new(secrets.clone());
            let aead = AesAead::new(&keys, "test_ns", "prefs").await.expect("aead");
            let backend = JsonFileBackend::open(&path).expect("open");
            let store =
                SealedStore::with_policy("prefs", backend, aead, ReadPolicy::Strict);
            store
                .set_string("hello-on-disk", "greeting")
                .await
                .expect("set");
        }

        let on_disk = fs::read_to_string(&path).expect("read snapshot");
        assert!(!on_disk.contains("hello-on-disk"));
        assert!(!on_disk.contains("greeting"));

        // A fresh store over the reopened snapshot, with the same key
        // material, reads the value back.
        let keys = StoredKeyProvider::new(secrets);
        let aead = AesAead::new(&keys, "test_ns", "prefs").await.expect("aead");
        let backend = JsonFileBackend::open(&path).expect("reopen");
        let store = SealedStore::with_policy("prefs", backend, aead, ReadPolicy::Strict);
        assert_eq!(
            store.string_for("greeting", "").await.expect("get"),
            "hello-on-disk"
        );
    }
}
