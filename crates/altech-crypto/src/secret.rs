use std::{
    fmt,
    sync::{Arc, Mutex},
};

use altech_core::{registry::DEVICE_SECRET, storage::SlotStore};
use async_trait::async_trait;
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::{info, instrument};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Per-device secret anchoring every derived key.
///
/// Held as the exact text found in storage (64 lowercase hex chars when we
/// generated it). The text is never normalized: key derivation hashes it as-is,
/// so records written by earlier versions stay decryptable.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DeviceSecret(String);

impl DeviceSecret {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeviceSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceSecret(<redacted>)")
    }
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("device secret read failed: {0}")]
    Read(String),
    #[error("device secret could not be persisted: {0}")]
    Persist(String),
    #[error("device secret unavailable: {0}")]
    Unavailable(String),
}

/// Source of the device secret. Idempotent after the first call.
#[async_trait]
pub trait DeviceSecretProvider: Send + Sync {
    async fn get_or_create(&self) -> Result<DeviceSecret, SecretError>;
}

/// Provider persisting the secret in a storage slot (`device-secret` by default),
/// so it survives restarts and travels with backups.
pub struct SlotSecretProvider<S: SlotStore> {
    store: S,
    slot: String,
    create_lock: tokio::sync::Mutex<()>,
}

impl<S: SlotStore> SlotSecretProvider<S> {
    pub fn new(store: S) -> Self {
        Self::with_slot(store, DEVICE_SECRET)
    }

    pub fn with_slot(store: S, slot: impl Into<String>) -> Self {
        Self {
            store,
            slot: slot.into(),
            create_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn read(&self) -> Result<Option<DeviceSecret>, SecretError> {
        let stored = self
            .store
            .raw_get(&self.slot)
            .await
            .map_err(|e| SecretError::Read(e.to_string()))?;
        Ok(stored
            .filter(|text| !text.is_empty())
            .map(DeviceSecret::from_text))
    }
}

#[async_trait]
impl<S: SlotStore> DeviceSecretProvider for SlotSecretProvider<S> {
    #[instrument(skip_all, fields(slot = %self.slot))]
    async fn get_or_create(&self) -> Result<DeviceSecret, SecretError> {
        if let Some(existing) = self.read().await? {
            return Ok(existing);
        }

        // Two first-time callers must not both generate.
        let _guard = self.create_lock.lock().await;
        if let Some(existing) = self.read().await? {
            return Ok(existing);
        }

        // Only hand out a secret once it is durable; an unpersisted secret would
        // strand everything encrypted with it after a restart.
        let secret = generate_secret();
        self.store
            .raw_set(&self.slot, secret.as_str())
            .await
            .map_err(|e| SecretError::Persist(e.to_string()))?;
        info!("generated new device secret");
        Ok(secret)
    }
}

/// In-memory provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemorySecretProvider {
    inner: Arc<Mutex<Option<DeviceSecret>>>,
}

impl InMemorySecretProvider {
    pub fn with_secret(secret: DeviceSecret) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(secret))),
        }
    }

    /// Replace the held secret, simulating a restore from another device.
    pub fn replace(&self, secret: DeviceSecret) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(secret);
        }
    }
}

#[async_trait]
impl DeviceSecretProvider for InMemorySecretProvider {
    async fn get_or_create(&self) -> Result<DeviceSecret, SecretError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| SecretError::Unavailable(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let secret = generate_secret();
        *guard = Some(secret.clone());
        Ok(secret)
    }
}

#[async_trait]
impl<P: DeviceSecretProvider + ?Sized> DeviceSecretProvider for Arc<P> {
    async fn get_or_create(&self) -> Result<DeviceSecret, SecretError> {
        (**self).get_or_create().await
    }
}

/// Fresh 256-bit secret rendered as lowercase hex.
pub fn generate_secret() -> DeviceSecret {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let secret = DeviceSecret(hex::encode(bytes));
    bytes.zeroize();
    secret
}
