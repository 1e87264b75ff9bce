use std::sync::Arc;

use altech_core::{
    signals::Notifier,
    storage::{SlotStore, SlotWriteError},
};
use tracing::{error, instrument, warn};

use crate::generation::{SaveGeneration, SaveToken};

pub const QUOTA_WARNING: &str = "Storage full! Export your data to free space.";

/// Observer told about every committed write (the host schedules cloud sync here).
pub trait PersistListener: Send + Sync {
    fn persisted(&self, slot: &str);
}

/// Quota-aware write path in front of a raw slot store.
///
/// Writes never raise: the caller gets `true` on commit and `false` otherwise.
/// A `false` does not mean the previous value was replaced.
pub struct PersistenceGateway<S: SlotStore> {
    store: S,
    notifier: Arc<dyn Notifier>,
    listeners: Vec<Arc<dyn PersistListener>>,
}

impl<S: SlotStore> PersistenceGateway<S> {
    pub fn new(store: S, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn PersistListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    #[instrument(skip_all, fields(slot = %slot))]
    pub async fn persist(&self, slot: &str, raw: &str) -> bool {
        match self.store.raw_set(slot, raw).await {
            Ok(()) => {
                for listener in &self.listeners {
                    listener.persisted(slot);
                }
                true
            }
            Err(err @ SlotWriteError::QuotaExceeded { .. }) => {
                warn!("write rejected: {err}");
                self.notifier.toast(QUOTA_WARNING);
                false
            }
            Err(err) => {
                error!("write failed: {err}");
                false
            }
        }
    }

    /// Persist only if `token` is still the newest one issued by `generation`.
    /// A stale write is dropped silently and reported as `false`.
    pub async fn persist_if_current(
        &self,
        generation: &SaveGeneration,
        token: SaveToken,
        slot: &str,
        raw: &str,
    ) -> bool {
        if !generation.is_current(token) {
            warn!(slot, "dropping stale write");
            return false;
        }
        self.persist(slot, raw).await
    }

    /// Raw read; storage failures are logged and read as absent.
    pub async fn read(&self, slot: &str) -> Option<String> {
        match self.store.raw_get(slot).await {
            Ok(value) => value,
            Err(err) => {
                error!(slot, "read failed: {err}");
                None
            }
        }
    }

    pub async fn remove(&self, slot: &str) -> bool {
        match self.store.raw_delete(slot).await {
            Ok(()) => true,
            Err(err) => {
                error!(slot, "delete failed: {err}");
                false
            }
        }
    }
}
