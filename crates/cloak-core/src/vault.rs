use async_trait::async_trait;
use thiserror::Error;

use crate::backend::BackendError;

/// Errors surfaced by the typed settings API.
#[derive(Debug, Error)]
pub enum VaultError {
    /// A null-equivalent or empty key was supplied. Never retried.
    #[error("key must be a non-empty string")]
    InvalidKey,

    /// The crypto provider failed for reasons unrelated to tampering
    /// (misconfiguration, unavailable key material).
    #[error("crypto provider failure: {reason}")]
    Crypto { reason: String },

    /// Ciphertext failed its integrity/authenticity check: tampered input,
    /// wrong associated data, or wrong key.
    #[error("ciphertext failed authentication")]
    Authentication,

    /// A decoded value violated the codec's length or encoding invariants,
    /// typically a read requesting a different type than was written.
    #[error("stored value malformed: {reason}")]
    MalformedValue { reason: String },

    /// Stored bytes are not a valid ciphertext for this scheme at all.
    #[error("stored ciphertext malformed")]
    MalformedCiphertext,

    /// Backing-map failure.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// How a read that finds an unusable value (failed authentication, codec
/// mismatch) is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Raise the underlying `VaultError`. Default: silent fallbacks mask
    /// data corruption.
    #[default]
    Strict,
    /// Return the caller-supplied default, as the historical implementation
    /// did.
    Lenient,
}

/// Typed settings store over an encrypted backing map.
///
/// Getters take a caller-supplied default that is returned when the key is
/// absent. No type tag is stored: reading with a different type than was
/// written yields a codec failure or a reinterpretation of the raw bytes,
/// depending on widths (see `ReadPolicy` for how failures surface).
#[async_trait]
pub trait SettingsVault: Send + Sync {
    async fn set_string(&self, value: &str, key: &str) -> Result<(), VaultError>;
    async fn set_i32(&self, value: i32, key: &str) -> Result<(), VaultError>;
    async fn set_bool(&self, value: bool, key: &str) -> Result<(), VaultError>;
    async fn set_f32(&self, value: f32, key: &str) -> Result<(), VaultError>;
    async fn set_f64(&self, value: f64, key: &str) -> Result<(), VaultError>;
    async fn set_bytes(&self, value: &[u8], key: &str) -> Result<(), VaultError>;

    async fn string_for(&self, key: &str, default: &str) -> Result<String, VaultError>;
    async fn i32_for(&self, key: &str, default: i32) -> Result<i32, VaultError>;
    async fn bool_for(&self, key: &str, default: bool) -> Result<bool, VaultError>;
    async fn f32_for(&self, key: &str, default: f32) -> Result<f32, VaultError>;
    async fn f64_for(&self, key: &str, default: f64) -> Result<f64, VaultError>;
    async fn bytes_for(&self, key: &str, default: &[u8]) -> Result<Vec<u8>, VaultError>;

    /// Whether an entry exists for the key. Checks presence only; never
    /// decrypts the stored value.
    async fn contains(&self, key: &str) -> Result<bool, VaultError>;

    /// Remove the entry for the key (idempotent).
    async fn remove(&self, key: &str) -> Result<(), VaultError>;
}
