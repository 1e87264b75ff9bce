//! Record codec: JSON -> AES-256-GCM -> base64(nonce || ciphertext || tag).
//!
//! Encryption never prevents a save: when the cipher path fails the plain JSON
//! is returned instead. Decryption tries the cipher path, then plain JSON, and
//! only then reports the record unreadable.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    kdf::{CryptoContext, DerivedKey},
    secret::DeviceSecretProvider,
};

pub const NONCE_LEN: usize = 12;

/// Result of [`encrypt`]. Both variants are valid opaque strings to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sealed {
    Encrypted(String),
    /// Plain JSON, written when the cipher path was unavailable.
    Fallback(String),
}

impl Sealed {
    pub fn as_str(&self) -> &str {
        match self {
            Sealed::Encrypted(s) | Sealed::Fallback(s) => s,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Sealed::Encrypted(s) | Sealed::Fallback(s) => s,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Sealed::Encrypted(_))
    }
}

/// Result of [`decrypt`], recording which path produced the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opened<T> {
    Decrypted(T),
    /// Legacy plaintext record, or one written by the encrypt fallback.
    RecoveredPlaintext(T),
    Unreadable,
}

impl<T> Opened<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Opened::Decrypted(v) | Opened::RecoveredPlaintext(v) => Some(v),
            Opened::Unreadable => None,
        }
    }

    pub fn is_unreadable(&self) -> bool {
        matches!(self, Opened::Unreadable)
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    /// The value has no JSON form, so there is nothing to fall back to either.
    #[error("value could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
enum OpenError {
    #[error("key unavailable: {0}")]
    Key(String),
    #[error("not base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("record shorter than nonce")]
    Truncated,
    #[error("authentication failed")]
    Auth,
    #[error("decrypted payload is not the expected JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize `value` and seal it under the context's derived key.
pub async fn encrypt<P, T>(ctx: &CryptoContext<P>, value: &T) -> Result<Sealed, CodecError>
where
    P: DeviceSecretProvider,
    T: Serialize + ?Sized,
{
    let json = serde_json::to_string(value)?;

    let key = match ctx.derived_key().await {
        Ok(key) => key,
        Err(err) => {
            warn!("encryption unavailable, storing plaintext: {err}");
            return Ok(Sealed::Fallback(json));
        }
    };

    match seal(&key, json.as_bytes()) {
        Ok(record) => Ok(Sealed::Encrypted(record)),
        Err(reason) => {
            warn!("encryption failed, storing plaintext: {reason}");
            Ok(Sealed::Fallback(json))
        }
    }
}

/// Recover a value from an opaque record. Never fails; unusable input is `Unreadable`.
pub async fn decrypt<P, T>(ctx: &CryptoContext<P>, opaque: &str) -> Opened<T>
where
    P: DeviceSecretProvider,
    T: DeserializeOwned,
{
    let cipher_err = match open_with_context(ctx, opaque).await {
        Ok(value) => return Opened::Decrypted(value),
        Err(err) => err,
    };
    debug!("cipher path failed ({cipher_err}), trying plaintext");

    match serde_json::from_str(opaque) {
        Ok(value) => Opened::RecoveredPlaintext(value),
        Err(_) => {
            warn!("record unreadable: {cipher_err}");
            Opened::Unreadable
        }
    }
}

async fn open_with_context<P, T>(ctx: &CryptoContext<P>, opaque: &str) -> Result<T, OpenError>
where
    P: DeviceSecretProvider,
    T: DeserializeOwned,
{
    let key = ctx
        .derived_key()
        .await
        .map_err(|e| OpenError::Key(e.to_string()))?;
    let plaintext = open(&key, opaque)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

fn seal(key: &DerivedKey, plaintext: &[u8]) -> Result<String, aes_gcm::Error> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher.encrypt(&nonce, plaintext)?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(nonce.as_slice());
    combined.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(combined))
}

fn open(key: &DerivedKey, opaque: &str) -> Result<Vec<u8>, OpenError> {
    let combined = STANDARD.decode(opaque.trim())?;
    if combined.len() < NONCE_LEN {
        return Err(OpenError::Truncated);
    }
    let (nonce, ciphertext) = combined.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| OpenError::Auth)
}
