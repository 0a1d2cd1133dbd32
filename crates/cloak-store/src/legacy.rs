//! Scheme B: the static block-cipher fallback.
//!
//! [`StaticCipher`] encrypts every payload under one AES-256-CBC key/IV
//! pair generated once per alias and persisted through the key lifecycle
//! manager. Identical plaintexts therefore produce identical ciphertexts
//! (an equality leak), and there is no authentication: tampering is not
//! reliably detected. [`LegacyStore`] keeps plaintext key names in the
//! backing map and encrypts values only. Both are retained to read and
//! write data produced by the older design; new data belongs in
//! [`crate::sealed::SealedStore`].

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use cloak_core::{
    backend::{RawValue, SettingsBackend},
    vault::{SettingsVault, VaultError},
};
use thiserror::Error;
use tracing::instrument;

use crate::key_provider::{KeyError, KeyMaterial, KeyProvider};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES-256 key length.
pub const KEY_LEN: usize = 32;
/// AES block / IV length.
pub const IV_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("cipher unavailable: {reason}")]
    Unavailable { reason: String },
    /// Not decryptable at all: bad base64, bad padding, or bad utf-8.
    /// Note that undetected corruption decrypts to garbage instead.
    #[error("malformed ciphertext")]
    Malformed,
}

/// AES-256-CBC with a durable per-alias key and IV.
pub struct StaticCipher {
    key: KeyMaterial,
    iv: KeyMaterial,
}

impl StaticCipher {
    /// Load (or create) the key and IV for `alias`, persisted under
    /// `{alias}_aes_key` and `{alias}_aes_iv`.
    pub async fn new<P: KeyProvider>(provider: &P, alias: &str) -> Result<Self, KeyError> {
        let key = provider
            .get_or_create(&format!("{alias}_aes_key"), KEY_LEN)
            .await?;
        let iv = provider
            .get_or_create(&format!("{alias}_aes_iv"), IV_LEN)
            .await?;
        Ok(Self { key, iv })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let cipher = Aes256CbcEnc::new_from_slices(&self.key.bytes, &self.iv.bytes).map_err(
            |err| CipherError::Unavailable {
                reason: err.to_string(),
            },
        )?;
        Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let cipher = Aes256CbcDec::new_from_slices(&self.key.bytes, &self.iv.bytes).map_err(
            |err| CipherError::Unavailable {
                reason: err.to_string(),
            },
        )?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CipherError::Malformed)
    }

    /// Encrypt a string, returning base64 for text transport.
    pub fn encrypt_str(&self, value: &str) -> Result<String, CipherError> {
        Ok(general_purpose::STANDARD.encode(self.encrypt(value.as_bytes())?))
    }

    /// Inverse of [`Self::encrypt_str`].
    pub fn decrypt_str(&self, value: &str) -> Result<String, CipherError> {
        let raw = general_purpose::STANDARD
            .decode(value)
            .map_err(|_| CipherError::Malformed)?;
        String::from_utf8(self.decrypt(&raw)?).map_err(|_| CipherError::Malformed)
    }
}

/// Scheme B settings store: plaintext key names, statically encrypted
/// values. Reads are lenient throughout, as the original behaved: absent,
/// undecryptable, or wrong-shaped entries yield the caller default.
pub struct LegacyStore<B> {
    backend: B,
    cipher: StaticCipher,
}

impl<B: SettingsBackend> LegacyStore<B> {
    pub fn new(backend: B, cipher: StaticCipher) -> Self {
        Self { backend, cipher }
    }

    /// Open a named store, deriving the cipher alias the way the original
    /// implementation did.
    pub async fn open<P: KeyProvider>(
        name: &str,
        backend: B,
        provider: &P,
    ) -> Result<Self, KeyError> {
        let cipher = StaticCipher::new(provider, &format!("__encrypted_def_{name}")).await?;
        Ok(Self::new(backend, cipher))
    }

    async fn write_blob(&self, encoded: &[u8], key: &str) -> Result<(), VaultError> {
        validate_key(key)?;
        let ciphertext = self.cipher.encrypt(encoded).map_err(map_cipher)?;
        self.backend
            .set(key, RawValue::Blob(ciphertext))
            .await?;
        Ok(())
    }

    /// Decrypt the blob entry for `key`, or `None` when the entry is
    /// absent, text-shaped, or undecryptable.
    async fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
        validate_key(key)?;
        let Some(value) = self.backend.get(key).await? else {
            return Ok(None);
        };
        Ok(value
            .as_blob()
            .and_then(|ciphertext| self.cipher.decrypt(ciphertext).ok()))
    }
}

#[async_trait]
impl<B: SettingsBackend> SettingsVault for LegacyStore<B> {
    #[instrument(skip_all, fields(key))]
    async fn set_string(&self, value: &str, key: &str) -> Result<(), VaultError> {
        validate_key(key)?;
        let ciphertext = self.cipher.encrypt_str(value).map_err(map_cipher)?;
        self.backend.set(key, RawValue::Text(ciphertext)).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(key))]
    async fn set_i32(&self, value: i32, key: &str) -> Result<(), VaultError> {
        self.write_blob(&value.to_le_bytes(), key).await
    }

    #[instrument(skip_all, fields(key))]
    async fn set_bool(&self, value: bool, key: &str) -> Result<(), VaultError> {
        self.write_blob(&[u8::from(value)], key).await
    }

    #[instrument(skip_all, fields(key))]
    async fn set_f32(&self, value: f32, key: &str) -> Result<(), VaultError> {
        self.write_blob(&value.to_le_bytes(), key).await
    }

    #[instrument(skip_all, fields(key))]
    async fn set_f64(&self, value: f64, key: &str) -> Result<(), VaultError> {
        self.write_blob(&value.to_le_bytes(), key).await
    }

    #[instrument(skip_all, fields(key))]
    async fn set_bytes(&self, value: &[u8], key: &str) -> Result<(), VaultError> {
        self.write_blob(value, key).await
    }

    #[instrument(skip_all, fields(key))]
    async fn string_for(&self, key: &str, default: &str) -> Result<String, VaultError> {
        validate_key(key)?;
        let Some(value) = self.backend.get(key).await? else {
            return Ok(default.to_string());
        };
        Ok(value
            .as_text()
            .and_then(|ciphertext| self.cipher.decrypt_str(ciphertext).ok())
            .unwrap_or_else(|| default.to_string()))
    }

    // Numeric reads mirror the original's size-agnostic conversions: the
    // leading bytes of an oversized buffer are taken at face value.

    #[instrument(skip_all, fields(key))]
    async fn i32_for(&self, key: &str, default: i32) -> Result<i32, VaultError> {
        Ok(self
            .read_blob(key)
            .await?
            .and_then(|buf| buf.get(..4).map(prefix_i32))
            .unwrap_or(default))
    }

    #[instrument(skip_all, fields(key))]
    async fn bool_for(&self, key: &str, default: bool) -> Result<bool, VaultError> {
        Ok(self
            .read_blob(key)
            .await?
            .and_then(|buf| buf.first().map(|b| *b != 0))
            .unwrap_or(default))
    }

    #[instrument(skip_all, fields(key))]
    async fn f32_for(&self, key: &str, default: f32) -> Result<f32, VaultError> {
        Ok(self
            .read_blob(key)
            .await?
            .and_then(|buf| buf.get(..4).map(prefix_f32))
            .unwrap_or(default))
    }

    #[instrument(skip_all, fields(key))]
    async fn f64_for(&self, key: &str, default: f64) -> Result<f64, VaultError> {
        Ok(self
            .read_blob(key)
            .await?
            .and_then(|buf| buf.get(..8).map(prefix_f64))
            .unwrap_or(default))
    }

    #[instrument(skip_all, fields(key))]
    async fn bytes_for(&self, key: &str, default: &[u8]) -> Result<Vec<u8>, VaultError> {
        Ok(self
            .read_blob(key)
            .await?
            .unwrap_or_else(|| default.to_vec()))
    }

    #[instrument(skip_all, fields(key))]
    async fn contains(&self, key: &str) -> Result<bool, VaultError> {
        validate_key(key)?;
        Ok(self.backend.contains(key).await?)
    }

    #[instrument(skip_all, fields(key))]
    async fn remove(&self, key: &str) -> Result<(), VaultError> {
        validate_key(key)?;
        Ok(self.backend.remove(key).await?)
    }
}

fn validate_key(key: &str) -> Result<(), VaultError> {
    if key.is_empty() {
        return Err(VaultError::InvalidKey);
    }
    Ok(())
}

fn map_cipher(err: CipherError) -> VaultError {
    match err {
        CipherError::Unavailable { reason } => VaultError::Crypto { reason },
        CipherError::Malformed => VaultError::MalformedCiphertext,
    }
}

fn prefix_i32(buf: &[u8]) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(buf);
    i32::from_le_bytes(bytes)
}

fn prefix_f32(buf: &[u8]) -> f32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(buf);
    f32::from_le_bytes(bytes)
}

fn prefix_f64(buf: &[u8]) -> f64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(buf);
    f64::from_le_bytes(bytes)
}
