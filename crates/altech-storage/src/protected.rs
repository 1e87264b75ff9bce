use std::sync::Arc;

use altech_core::storage::SlotStore;
use altech_crypto::{
    codec::{self, Opened},
    kdf::CryptoContext,
    secret::DeviceSecretProvider,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, instrument, warn};

use crate::{
    gateway::PersistenceGateway,
    generation::{SaveGeneration, SaveToken},
};

/// Encrypt-then-persist and read-then-decrypt over named slots.
pub struct ProtectedSlots<S: SlotStore, P: DeviceSecretProvider> {
    gateway: Arc<PersistenceGateway<S>>,
    crypto: Arc<CryptoContext<P>>,
}

impl<S: SlotStore, P: DeviceSecretProvider> ProtectedSlots<S, P> {
    pub fn new(gateway: Arc<PersistenceGateway<S>>, crypto: Arc<CryptoContext<P>>) -> Self {
        Self { gateway, crypto }
    }

    pub fn gateway(&self) -> &PersistenceGateway<S> {
        &self.gateway
    }

    pub fn crypto(&self) -> &CryptoContext<P> {
        &self.crypto
    }

    /// Seal `value` and commit it. `false` when the value cannot be serialized
    /// or the write fails.
    #[instrument(skip_all, fields(slot = %slot))]
    pub async fn save<T: Serialize + ?Sized>(&self, slot: &str, value: &T) -> bool {
        match codec::encrypt(&*self.crypto, value).await {
            Ok(sealed) => self.gateway.persist(slot, sealed.as_str()).await,
            Err(err) => {
                error!("not saved: {err}");
                false
            }
        }
    }

    /// Like [`save`](Self::save), but the write is dropped if a newer save was
    /// started on `generation` while this one was encrypting.
    pub async fn save_latest<T: Serialize + ?Sized>(
        &self,
        generation: &SaveGeneration,
        token: SaveToken,
        slot: &str,
        value: &T,
    ) -> bool {
        match codec::encrypt(&*self.crypto, value).await {
            Ok(sealed) => {
                self.gateway
                    .persist_if_current(generation, token, slot, sealed.as_str())
                    .await
            }
            Err(err) => {
                error!(slot, "not saved: {err}");
                false
            }
        }
    }

    /// Decode a slot, reporting which path produced the value. `None` when the slot is absent.
    pub async fn load_outcome<T: DeserializeOwned>(&self, slot: &str) -> Option<Opened<T>> {
        let raw = self.gateway.read(slot).await?;
        Some(codec::decrypt(&*self.crypto, &raw).await)
    }

    /// Decode a slot; absent and unreadable slots are both `None`.
    pub async fn load<T: DeserializeOwned>(&self, slot: &str) -> Option<T> {
        match self.load_outcome(slot).await? {
            Opened::Unreadable => {
                warn!(slot, "stored record could not be decrypted; it may need to be re-entered");
                None
            }
            opened => opened.into_value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use altech_core::{signals::RecordingNotifier, storage::InMemorySlotStore};
    use altech_crypto::secret::InMemorySecretProvider;
    use serde_json::{json, Value};

    use super::*;

    fn protected(
        store: InMemorySlotStore,
    ) -> ProtectedSlots<InMemorySlotStore, InMemorySecretProvider> {
        let gateway = PersistenceGateway::new(store, Arc::new(RecordingNotifier::new()));
        ProtectedSlots::new(
            Arc::new(gateway),
            Arc::new(CryptoContext::new(InMemorySecretProvider::default())),
        )
    }

    #[tokio::test]
    async fn save_then_load_round_trips_and_hides_plaintext() {
        let store = InMemorySlotStore::new();
        let slots = protected(store.clone());
        let state = json!({"firstName": "Grace", "zip": "98101"});

        assert!(slots.save("app-state", &state).await);
        let raw = store.raw_get("app-state").await.expect("get").expect("present");
        assert!(!raw.contains("Grace"));

        let loaded: Option<Value> = slots.load("app-state").await;
        assert_eq!(loaded, Some(state));
        let outcome: Option<Opened<Value>> = slots.load_outcome("app-state").await;
        assert!(matches!(outcome, Some(Opened::Decrypted(_))));
    }

    #[tokio::test]
    async fn legacy_plaintext_slot_is_recovered() {
        let store = InMemorySlotStore::new();
        store
            .raw_set("app-quotes", r#"[{"id":"q1"}]"#)
            .await
            .expect("seed");
        let slots = protected(store);

        let outcome: Option<Opened<Value>> = slots.load_outcome("app-quotes").await;
        assert_eq!(
            outcome,
            Some(Opened::RecoveredPlaintext(json!([{"id": "q1"}])))
        );
    }

    #[tokio::test]
    async fn absent_and_corrupt_slots_load_as_none() {
        let store = InMemorySlotStore::new();
        store.raw_set("coi-draft", "%%corrupt%%").await.expect("seed");
        let slots = protected(store);

        assert_eq!(slots.load::<Value>("missing").await, None);
        assert_eq!(slots.load::<Value>("coi-draft").await, None);
        assert!(slots.load_outcome::<Value>("missing").await.is_none());
    }

    #[tokio::test]
    async fn save_latest_discards_superseded_save() {
        let slots = protected(InMemorySlotStore::new());
        let generation = SaveGeneration::default();

        let early = generation.next();
        let late = generation.next();
        assert!(slots.save_latest(&generation, late, "app-state", &json!(2)).await);
        assert!(!slots.save_latest(&generation, early, "app-state", &json!(1)).await);
        assert_eq!(slots.load::<Value>("app-state").await, Some(json!(2)));
    }
}
