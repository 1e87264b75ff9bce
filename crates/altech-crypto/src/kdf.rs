//! Key derivation: device secret -> SHA-256 fingerprint -> PBKDF2-HMAC-SHA256 -> AES-256 key.
//!
//! The constants below are part of the on-disk format. Changing any of them
//! makes every existing record undecryptable.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::secret::{DeviceSecret, DeviceSecretProvider, SecretError};

/// Application constant mixed into the fingerprint.
pub const APP_CONSTANT: &str = "ALTECH_FIELD_PRO_v2";
/// Fixed PBKDF2 salt.
pub const KDF_SALT: &[u8] = b"altech_v6_salt_2026";
pub const KDF_ITERATIONS: u32 = 100_000;

/// 256-bit AES-GCM key. Never persisted; zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; 32]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error("key derivation failed: {0}")]
    Derivation(String),
}

/// Hex SHA-256 of `secret || "||" || APP_CONSTANT`.
pub fn fingerprint(secret: &DeviceSecret) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_str().as_bytes());
    hasher.update(b"||");
    hasher.update(APP_CONSTANT.as_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic, slow derivation. Blocks for the full PBKDF2 run.
pub fn derive_key(secret: &DeviceSecret) -> DerivedKey {
    let mut password = fingerprint(secret);
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut out);
    password.zeroize();
    DerivedKey(out)
}

struct CachedKey {
    secret: DeviceSecret,
    key: Arc<DerivedKey>,
}

/// Holds the secret provider and a memoized derived key.
///
/// The cache is keyed by the secret text it was derived from: every lookup
/// re-reads the secret and re-derives when it differs, so a restored
/// `device-secret` slot takes effect without a restart.
pub struct CryptoContext<P: DeviceSecretProvider> {
    provider: P,
    cache: Mutex<Option<CachedKey>>,
}

impl<P: DeviceSecretProvider> CryptoContext<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            cache: Mutex::new(None),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub async fn device_secret(&self) -> Result<DeviceSecret, SecretError> {
        self.provider.get_or_create().await
    }

    pub async fn derived_key(&self) -> Result<Arc<DerivedKey>, KeyError> {
        let secret = self.device_secret().await?;

        if let Some(key) = self.cached(&secret)? {
            return Ok(key);
        }

        debug!("deriving key from device secret");
        let input = secret.clone();
        let key = tokio::task::spawn_blocking(move || derive_key(&input))
            .await
            .map_err(|e| KeyError::Derivation(e.to_string()))?;
        let key = Arc::new(key);

        let mut cache = self
            .cache
            .lock()
            .map_err(|e| KeyError::Derivation(format!("lock poisoned: {e}")))?;
        *cache = Some(CachedKey {
            secret,
            key: key.clone(),
        });
        Ok(key)
    }

    /// Drop the memoized key; the next call derives again.
    pub fn forget_key(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = None;
        }
    }

    fn cached(&self, secret: &DeviceSecret) -> Result<Option<Arc<DerivedKey>>, KeyError> {
        let cache = self
            .cache
            .lock()
            .map_err(|e| KeyError::Derivation(format!("lock poisoned: {e}")))?;
        Ok(cache
            .as_ref()
            .filter(|c| &c.secret == secret)
            .map(|c| c.key.clone()))
    }
}
