use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// Failure modes of a raw slot write. Quota exhaustion is kept distinct so the
/// persistence gateway can tell the user to export and free space.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotWriteError {
    /// The substrate refused the write because it is full.
    #[error("storage quota exceeded writing {slot}: needed {needed} bytes, {available} available")]
    QuotaExceeded {
        slot: String,
        needed: u64,
        available: u64,
    },
    /// Any other storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Failure reading or enumerating slots. Absence is not an error; it is `Ok(None)`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("storage read failure: {reason}")]
pub struct SlotReadError {
    pub reason: String,
}

/// Raw key/value substrate holding one opaque string per named slot.
///
/// Implementations never interpret values: encrypted records and legacy
/// plaintext JSON are both just strings here.
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Read the current value of a slot, `None` when the slot was never written or was deleted.
    async fn raw_get(&self, slot: &str) -> Result<Option<String>, SlotReadError>;

    /// Overwrite a slot. On error the previous value is left in place.
    async fn raw_set(&self, slot: &str, value: &str) -> Result<(), SlotWriteError>;

    /// Remove a slot (idempotent).
    async fn raw_delete(&self, slot: &str) -> Result<(), SlotWriteError>;

    /// Names of every slot currently holding a value, sorted.
    async fn slot_names(&self) -> Result<Vec<String>, SlotReadError>;
}

#[async_trait]
impl<S: SlotStore + ?Sized> SlotStore for Arc<S> {
    async fn raw_get(&self, slot: &str) -> Result<Option<String>, SlotReadError> {
        (**self).raw_get(slot).await
    }

    async fn raw_set(&self, slot: &str, value: &str) -> Result<(), SlotWriteError> {
        (**self).raw_set(slot, value).await
    }

    async fn raw_delete(&self, slot: &str) -> Result<(), SlotWriteError> {
        (**self).raw_delete(slot).await
    }

    async fn slot_names(&self) -> Result<Vec<String>, SlotReadError> {
        (**self).slot_names().await
    }
}

/// In-memory slot store for tests and ephemeral sessions.
///
/// An optional byte capacity (slot name plus value lengths, like browser
/// local storage accounting) simulates quota exhaustion.
#[derive(Debug, Default, Clone)]
pub struct InMemorySlotStore {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
    capacity: Option<u64>,
}

impl InMemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes pushing total usage above `bytes`.
    pub fn with_capacity(bytes: u64) -> Self {
        Self {
            inner: Arc::default(),
            capacity: Some(bytes),
        }
    }

    /// Bytes currently accounted against the capacity.
    pub fn used_bytes(&self) -> u64 {
        self.inner
            .lock()
            .map(|map| map.iter().map(|(k, v)| entry_size(k, v)).sum())
            .unwrap_or(0)
    }
}

fn entry_size(slot: &str, value: &str) -> u64 {
    (slot.len() + value.len()) as u64
}

#[async_trait]
impl SlotStore for InMemorySlotStore {
    async fn raw_get(&self, slot: &str) -> Result<Option<String>, SlotReadError> {
        let map = self.inner.lock().map_err(|err| SlotReadError {
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(map.get(slot).cloned())
    }

    async fn raw_set(&self, slot: &str, value: &str) -> Result<(), SlotWriteError> {
        let mut map = self.inner.lock().map_err(|err| SlotWriteError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;

        if let Some(capacity) = self.capacity {
            let used: u64 = map
                .iter()
                .filter(|(k, _)| k.as_str() != slot)
                .map(|(k, v)| entry_size(k, v))
                .sum();
            let needed = entry_size(slot, value);
            let available = capacity.saturating_sub(used);
            if needed > available {
                return Err(SlotWriteError::QuotaExceeded {
                    slot: slot.to_string(),
                    needed,
                    available,
                });
            }
        }

        map.insert(slot.to_string(), value.to_string());
        Ok(())
    }

    async fn raw_delete(&self, slot: &str) -> Result<(), SlotWriteError> {
        let mut map = self.inner.lock().map_err(|err| SlotWriteError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.remove(slot);
        Ok(())
    }

    async fn slot_names(&self) -> Result<Vec<String>, SlotReadError> {
        let map = self.inner.lock().map_err(|err| SlotReadError {
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(map.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_and_overwrite() {
        let store = InMemorySlotStore::new();
        assert_eq!(store.raw_get("app-state").await.expect("get"), None);

        store.raw_set("app-state", "one").await.expect("set");
        store.raw_set("app-state", "two").await.expect("overwrite");
        assert_eq!(
            store.raw_get("app-state").await.expect("get").as_deref(),
            Some("two")
        );
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemorySlotStore::new();
        store.raw_set("k", "v").await.expect("set");
        store.raw_delete("k").await.expect("delete");
        store.raw_delete("k").await.expect("delete again");
        assert_eq!(store.raw_get("k").await.expect("get"), None);
        assert!(store.slot_names().await.expect("names").is_empty());
    }

    #[tokio::test]
    async fn capacity_rejects_oversized_write_and_keeps_previous_value() {
        let store = InMemorySlotStore::with_capacity(10);
        store.raw_set("k", "12345").await.expect("fits");

        let err = store
            .raw_set("k", "0123456789")
            .await
            .expect_err("should exceed quota");
        assert!(matches!(err, SlotWriteError::QuotaExceeded { .. }));
        assert_eq!(store.raw_get("k").await.expect("get").as_deref(), Some("12345"));
    }

    #[tokio::test]
    async fn overwrite_does_not_double_count_capacity() {
        let store = InMemorySlotStore::with_capacity(6);
        store.raw_set("k", "abcde").await.expect("fits");
        store.raw_set("k", "vwxyz").await.expect("replacement fits");
        assert_eq!(store.used_bytes(), 6);
    }
}
