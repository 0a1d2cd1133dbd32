//! AEAD provider seam: randomized and deterministic encryption with
//! associated data.
//!
//! [`AesAead`] is the production binding: AES-256-GCM for values, with a
//! fresh random nonce prepended to each ciphertext, and AES-256-SIV
//! (RFC 5297) for the deterministic path used to derive storage keys. Both
//! keysets are loaded eagerly at construction; an unreachable key source is
//! fatal there, never mid-operation.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use aes_siv::siv::Aes256Siv;
use thiserror::Error;

use crate::key_provider::{KeyError, KeyMaterial, KeyProvider};

const GCM_NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;
const SIV_TAG_LEN: usize = 16;

/// AES-256-GCM key length.
pub const VALUE_KEY_LEN: usize = 32;
/// AES-256-SIV key length (two 256-bit subkeys).
pub const LOOKUP_KEY_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AeadError {
    /// The underlying cipher or its key is unusable.
    #[error("aead provider unavailable: {reason}")]
    Unavailable { reason: String },
    /// Tampered ciphertext, wrong associated data, or wrong key.
    #[error("ciphertext failed authentication")]
    Authentication,
    /// Input is not a valid ciphertext for this scheme at all.
    #[error("malformed ciphertext")]
    Malformed,
}

/// Encrypt/decrypt with associated data, in randomized and deterministic
/// flavors. Deterministic encryption always yields the same ciphertext for
/// the same plaintext and associated data for the lifetime of the key.
pub trait AeadProvider: Send + Sync {
    fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, AeadError>;
    fn decrypt(&self, ciphertext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, AeadError>;
    fn encrypt_deterministic(
        &self,
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>, AeadError>;
    fn decrypt_deterministic(
        &self,
        ciphertext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>, AeadError>;
}

/// AES-GCM + AES-SIV provider with key material from a [`KeyProvider`].
pub struct AesAead {
    value_key: KeyMaterial,
    lookup_key: KeyMaterial,
}

impl AesAead {
    /// Load (or create) both keysets for `alias` under `namespace`.
    /// The deterministic keyset lives under `{namespace}_{alias}_key`, the
    /// randomized one under `{namespace}_{alias}_value`.
    pub async fn new<P: KeyProvider>(
        provider: &P,
        namespace: &str,
        alias: &str,
    ) -> Result<Self, KeyError> {
        let lookup_key = provider
            .get_or_create(&format!("{namespace}_{alias}_key"), LOOKUP_KEY_LEN)
            .await?;
        let value_key = provider
            .get_or_create(&format!("{namespace}_{alias}_value"), VALUE_KEY_LEN)
            .await?;
        Ok(Self {
            value_key,
            lookup_key,
        })
    }

    fn value_cipher(&self) -> Result<Aes256Gcm, AeadError> {
        Aes256Gcm::new_from_slice(&self.value_key.bytes).map_err(|_| AeadError::Unavailable {
            reason: "value key has wrong length".to_string(),
        })
    }

    fn lookup_cipher(&self) -> Result<Aes256Siv, AeadError> {
        Aes256Siv::new_from_slice(&self.lookup_key.bytes).map_err(|_| AeadError::Unavailable {
            reason: "lookup key has wrong length".to_string(),
        })
    }
}

impl AeadProvider for AesAead {
    fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, AeadError> {
        let cipher = self.value_cipher()?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| AeadError::Unavailable {
                reason: "encrypt failed".to_string(),
            })?;

        // Nonce travels with the ciphertext: nonce || ciphertext || tag.
        let mut out = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, AeadError> {
        if ciphertext.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
            return Err(AeadError::Malformed);
        }
        let (nonce, body) = ciphertext.split_at(GCM_NONCE_LEN);
        let cipher = self.value_cipher()?;
        cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: body,
                    aad: associated_data,
                },
            )
            .map_err(|_| AeadError::Authentication)
    }

    fn encrypt_deterministic(
        &self,
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>, AeadError> {
        let mut cipher = self.lookup_cipher()?;
        cipher
            .encrypt([associated_data], plaintext)
            .map_err(|_| AeadError::Unavailable {
                reason: "deterministic encrypt failed".to_string(),
            })
    }

    fn decrypt_deterministic(
        &self,
        ciphertext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>, AeadError> {
        if ciphertext.len() < SIV_TAG_LEN {
            return Err(AeadError::Malformed);
        }
        let mut cipher = self.lookup_cipher()?;
        cipher
            .decrypt([associated_data], ciphertext)
            .map_err(|_| AeadError::Authentication)
    }
}
