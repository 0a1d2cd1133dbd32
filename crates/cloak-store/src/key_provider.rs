//! Key-material lifecycle: create-or-load durable secrets per alias.
//!
//! Material is generated lazily on first use, persisted through a
//! [`SecretStore`] (OS keyring in production; memory in tests), and
//! read-only afterwards. There is no rotation API.

use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use cloak_core::secrets::{SecretStore, SecretStoreError};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret bytes scoped by an alias. Zeroised on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    /// Alias the material was created under (for logging; never the bytes).
    #[zeroize(skip)]
    pub alias: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("alias", &self.alias)
            .field("bytes", &format!("<{} bytes redacted>", self.bytes.len()))
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("secure storage error: {0}")]
    Store(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

impl From<SecretStoreError> for KeyError {
    fn from(err: SecretStoreError) -> Self {
        KeyError::Store(err.to_string())
    }
}

/// Provides access to per-alias key material of a caller-chosen length.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_or_create(&self, alias: &str, len: usize) -> Result<KeyMaterial, KeyError>;
}

/// Key provider backed by a [`SecretStore`]: loads existing material for an
/// alias, or generates and persists fresh random bytes if the stored entry
/// is absent or has the wrong length.
///
/// A single lock serialises first-time generation, so concurrent callers in
/// one process agree on the material (first writer wins). Cross-process
/// first-time races remain the caller's problem.
pub struct StoredKeyProvider<S> {
    secrets: S,
    cache: Mutex<HashMap<String, KeyMaterial>>,
}

impl<S: SecretStore> StoredKeyProvider<S> {
    pub fn new(secrets: S) -> Self {
        Self {
            secrets,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<S: SecretStore> KeyProvider for StoredKeyProvider<S> {
    async fn get_or_create(&self, alias: &str, len: usize) -> Result<KeyMaterial, KeyError> {
        let mut cache = self.cache.lock().await;
        if let Some(existing) = cache.get(alias) {
            if existing.bytes.len() == len {
                return Ok(existing.clone());
            }
        }

        let material = match self.secrets.get(alias).await? {
            Some(bytes) if bytes.len() == len => {
                debug!(alias, "loaded existing key material");
                KeyMaterial {
                    alias: alias.to_string(),
                    bytes,
                }
            }
            Some(bytes) => {
                warn!(
                    alias,
                    stored = bytes.len(),
                    expected = len,
                    "stored key material has wrong length, regenerating"
                );
                self.generate_and_persist(alias, len).await?
            }
            None => self.generate_and_persist(alias, len).await?,
        };

        cache.insert(alias.to_string(), material.clone());
        Ok(material)
    }
}

impl<S: SecretStore> StoredKeyProvider<S> {
    async fn generate_and_persist(&self, alias: &str, len: usize) -> Result<KeyMaterial, KeyError> {
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        self.secrets.set(alias, &bytes).await?;
        debug!(alias, "generated and persisted new key material");
        Ok(KeyMaterial {
            alias: alias.to_string(),
            bytes,
        })
    }
}

/// OS keyring-backed secret store. Secret bytes are base64-armored into the
/// keyring's password slot under `(service, name)`.
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry, SecretStoreError> {
        keyring::Entry::new(&self.service, name).map_err(|err| SecretStoreError::Storage {
            reason: err.to_string(),
        })
    }
}

#[async_trait]
impl SecretStore for KeyringSecretStore {
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, SecretStoreError> {
        match self.entry(name)?.get_password() {
            Ok(armored) => match general_purpose::STANDARD.decode(&armored) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(err) => {
                    // Unreadable entries are treated as absent so the
                    // lifecycle manager can regenerate.
                    warn!(name, %err, "stored secret is not valid base64");
                    Ok(None)
                }
            },
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(SecretStoreError::Storage {
                reason: err.to_string(),
            }),
        }
    }

    async fn set(&self, name: &str, value: &[u8]) -> Result<(), SecretStoreError> {
        let armored = general_purpose::STANDARD.encode(value);
        self.entry(name)?
            .set_password(&armored)
            .map_err(|err| SecretStoreError::Storage {
                reason: err.to_string(),
            })
    }

    async fn remove(&self, name: &str) -> Result<(), SecretStoreError> {
        match self.entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(SecretStoreError::Storage {
                reason: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use cloak_core::secrets::MemorySecretStore;

    use super::*;

    #[tokio::test]
    async fn returns_same_material_across_calls() {
        let provider = StoredKeyProvider::new(MemorySecretStore::new());
        let first = provider.get_or_create("alias", 32).await.expect("create");
        let second = provider.get_or_create("alias", 32).await.expect("load");

        assert_eq!(first.bytes, second.bytes);
        assert_eq!(first.bytes.len(), 32);
    }

    #[tokio::test]
    async fn distinct_aliases_get_distinct_material() {
        let provider = StoredKeyProvider::new(MemorySecretStore::new());
        let a = provider.get_or_create("a", 32).await.expect("create a");
        let b = provider.get_or_create("b", 32).await.expect("create b");

        assert_ne!(a.bytes, b.bytes);
    }

    #[tokio::test]
    async fn material_survives_provider_restart() {
        let secrets = MemorySecretStore::new();
        let first = StoredKeyProvider::new(secrets.clone())
            .get_or_create("alias", 16)
            .await
            .expect("create");
        let second = StoredKeyProvider::new(secrets)
            .get_or_create("alias", 16)
            .await
            .expect("reload");

        assert_eq!(first.bytes, second.bytes);
    }

    #[tokio::test]
    async fn wrong_length_material_is_regenerated() {
        let secrets = MemorySecretStore::new();
        secrets.set("alias", &[1u8; 7]).await.expect("seed");

        let provider = StoredKeyProvider::new(secrets.clone());
        let material = provider.get_or_create("alias", 32).await.expect("create");
        assert_eq!(material.bytes.len(), 32);

        // The regenerated bytes replaced the malformed entry.
        let stored = secrets.get("alias").await.expect("get").expect("present");
        assert_eq!(stored, material.bytes);
    }

    #[test]
    fn debug_output_redacts_bytes() {
        let material = KeyMaterial {
            alias: "alias".into(),
            bytes: vec![0xAB; 32],
        };
        let rendered = format!("{material:?}");
        assert!(rendered.contains("redacted"));
        assert!(!rendered.contains("171")); // 0xAB
    }
}
