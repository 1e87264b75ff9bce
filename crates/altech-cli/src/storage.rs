use std::{path::PathBuf, sync::Arc};

use altech_core::{signals::Notifier, storage::SlotStore};
use altech_crypto::{kdf::CryptoContext, secret::SlotSecretProvider};
use altech_storage::{file_store::FileSlotStore, gateway::PersistenceGateway, protected::ProtectedSlots};
use color_eyre::Result;
use dirs::data_dir;
use tracing::debug;

use crate::config::Config;

/// Gateway plus protected-slot access sharing one store, the way the app wires it.
pub struct Layer<S: SlotStore + Clone> {
    pub gateway: Arc<PersistenceGateway<S>>,
    pub protected: ProtectedSlots<S, SlotSecretProvider<S>>,
}

impl<S: SlotStore + Clone> Layer<S> {
    /// The device secret lives in the same store as the records it protects.
    pub fn new(store: S, notifier: Arc<dyn Notifier>) -> Self {
        let gateway = Arc::new(PersistenceGateway::new(store.clone(), notifier));
        let crypto = Arc::new(CryptoContext::new(SlotSecretProvider::new(store)));
        let protected = ProtectedSlots::new(gateway.clone(), crypto);
        Self { gateway, protected }
    }
}

/// Resolve the default slot directory.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("altech").join("slots"))
}

/// Build the file store using config overrides.
pub fn store_from_config(config: &Config) -> Result<Arc<FileSlotStore>> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    debug!(?root, "opening slot store");
    let mut store = FileSlotStore::new(root);
    if let Some(quota) = config.quota_bytes {
        store = store.with_quota(Some(quota));
    }
    Ok(Arc::new(store))
}

pub fn open(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Layer<Arc<FileSlotStore>>> {
    Ok(Layer::new(store_from_config(config)?, notifier))
}

/// Helper for tests: a layer over a file store rooted at a temp dir.
#[cfg(test)]
pub fn test_layer(
    root: impl Into<PathBuf>,
    notifier: Arc<dyn Notifier>,
) -> Layer<Arc<FileSlotStore>> {
    Layer::new(Arc::new(FileSlotStore::new(root)), notifier)
}
