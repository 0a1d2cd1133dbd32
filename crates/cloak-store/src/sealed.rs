//! The sealed store: typed settings over an opaque backing map.
//!
//! Lookup keys are encrypted deterministically (so every write to the same
//! logical key addresses the same backing slot) with the store's name as
//! associated data, then base64url-encoded for the textual key space.
//! Values are codec-encoded and sealed with the randomized AEAD, bound to
//! the raw storage-key bytes as associated data so ciphertexts cannot be
//! swapped between entries.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use cloak_core::{
    backend::{RawValue, SettingsBackend},
    vault::{ReadPolicy, SettingsVault, VaultError},
};
use tracing::instrument;

use crate::{
    aead::{AeadError, AeadProvider},
    codec::{self, CodecError},
};

/// Scheme A encrypted store. Generic over the backing map and the AEAD
/// provider; construction of the provider (and with it, key material) is
/// the fatal-on-failure step, so an instance of this type is always usable.
pub struct SealedStore<B, A> {
    name: String,
    backend: B,
    aead: A,
    policy: ReadPolicy,
}

/// A derived backing-map slot: the raw deterministic ciphertext of the
/// logical key, and its text-safe encoding used as the actual map key.
struct StorageKey {
    raw: Vec<u8>,
    encoded: String,
}

impl<B: SettingsBackend, A: AeadProvider> SealedStore<B, A> {
    pub fn new(name: impl Into<String>, backend: B, aead: A) -> Self {
        Self::with_policy(name, backend, aead, ReadPolicy::default())
    }

    pub fn with_policy(
        name: impl Into<String>,
        backend: B,
        aead: A,
        policy: ReadPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            backend,
            aead,
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn storage_key(&self, key: &str) -> Result<StorageKey, VaultError> {
        if key.is_empty() {
            return Err(VaultError::InvalidKey);
        }
        let raw = self
            .aead
            .encrypt_deterministic(key.as_bytes(), self.name.as_bytes())
            .map_err(map_aead)?;
        let encoded = URL_SAFE_NO_PAD.encode(&raw);
        Ok(StorageKey { raw, encoded })
    }

    async fn write(&self, encoded_value: Vec<u8>, key: &str) -> Result<(), VaultError> {
        let slot = self.storage_key(key)?;
        let ciphertext = self
            .aead
            .encrypt(&encoded_value, &slot.raw)
            .map_err(map_aead)?;
        self.backend
            .set(&slot.encoded, RawValue::Blob(ciphertext))
            .await?;
        Ok(())
    }

    /// Read and unseal the entry for `key`. `None` means absent, or —
    /// under [`ReadPolicy::Lenient`] — present but unusable.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
        let slot = self.storage_key(key)?;
        let Some(value) = self.backend.get(&slot.encoded).await? else {
            return Ok(None);
        };

        let unsealed = match value.as_blob() {
            Some(ciphertext) => self.aead.decrypt(ciphertext, &slot.raw).map_err(map_aead),
            None => Err(VaultError::MalformedCiphertext),
        };
        match unsealed {
            Ok(buf) => Ok(Some(buf)),
            Err(err) => self.absorb(err),
        }
    }

    async fn decoded<T: Send>(
        &self,
        key: &str,
        default: T,
        decode: fn(&[u8]) -> Result<T, CodecError>,
    ) -> Result<T, VaultError> {
        match self.read(key).await? {
            None => Ok(default),
            Some(buf) => match decode(&buf) {
                Ok(value) => Ok(value),
                Err(err) => {
                    let absorbed = self.absorb(VaultError::MalformedValue {
                        reason: err.to_string(),
                    })?;
                    Ok(absorbed.unwrap_or(default))
                }
            },
        }
    }

    fn absorb<T>(&self, err: VaultError) -> Result<Option<T>, VaultError> {
        match self.policy {
            ReadPolicy::Strict => Err(err),
            ReadPolicy::Lenient => Ok(None),
        }
    }
}

#[async_trait]
impl<B: SettingsBackend, A: AeadProvider> SettingsVault for SealedStore<B, A> {
    #[instrument(skip_all, fields(key))]
    async fn set_string(&self, value: &str, key: &str) -> Result<(), VaultError> {
        self.write(codec::encode_str(value), key).await
    }

    #[instrument(skip_all, fields(key))]
    async fn set_i32(&self, value: i32, key: &str) -> Result<(), VaultError> {
        self.write(codec::encode_i32(value), key).await
    }

    #[instrument(skip_all, fields(key))]
    async fn set_bool(&self, value: bool, key: &str) -> Result<(), VaultError> {
        self.write(codec::encode_bool(value), key).await
    }

    #[instrument(skip_all, fields(key))]
    async fn set_f32(&self, value: f32, key: &str) -> Result<(), VaultError> {
        self.write(codec::encode_f32(value), key).await
    }

    #[instrument(skip_all, fields(key))]
    async fn set_f64(&self, value: f64, key: &str) -> Result<(), VaultError> {
        self.write(codec::encode_f64(value), key).await
    }

    #[instrument(skip_all, fields(key))]
    async fn set_bytes(&self, value: &[u8], key: &str) -> Result<(), VaultError> {
        self.write(value.to_vec(), key).await
    }

    #[instrument(skip_all, fields(key))]
    async fn string_for(&self, key: &str, default: &str) -> Result<String, VaultError> {
        self.decoded(key, default.to_string(), codec::decode_str)
            .await
    }

    #[instrument(skip_all, fields(key))]
    async fn i32_for(&self, key: &str, default: i32) -> Result<i32, VaultError> {
        self.decoded(key, default, codec::decode_i32).await
    }

    #[instrument(skip_all, fields(key))]
    async fn bool_for(&self, key: &str, default: bool) -> Result<bool, VaultError> {
        self.decoded(key, default, codec::decode_bool).await
    }

    #[instrument(skip_all, fields(key))]
    async fn f32_for(&self, key: &str, default: f32) -> Result<f32, VaultError> {
        self.decoded(key, default, codec::decode_f32).await
    }

    #[instrument(skip_all, fields(key))]
    async fn f64_for(&self, key: &str, default: f64) -> Result<f64, VaultError> {
        self.decoded(key, default, codec::decode_f64).await
    }

    #[instrument(skip_all, fields(key))]
    async fn bytes_for(&self, key: &str, default: &[u8]) -> Result<Vec<u8>, VaultError> {
        self.decoded(key, default.to_vec(), passthrough).await
    }

    #[instrument(skip_all, fields(key))]
    async fn contains(&self, key: &str) -> Result<bool, VaultError> {
        let slot = self.storage_key(key)?;
        Ok(self.backend.contains(&slot.encoded).await?)
    }

    #[instrument(skip_all, fields(key))]
    async fn remove(&self, key: &str) -> Result<(), VaultError> {
        let slot = self.storage_key(key)?;
        Ok(self.backend.remove(&slot.encoded).await?)
    }
}

fn passthrough(buf: &[u8]) -> Result<Vec<u8>, CodecError> {
    Ok(buf.to_vec())
}

fn map_aead(err: AeadError) -> VaultError {
    match err {
        AeadError::Unavailable { reason } => VaultError::Crypto { reason },
        AeadError::Authentication => VaultError::Authentication,
        AeadError::Malformed => VaultError::MalformedCiphertext,
    }
}
