use altech_core::storage::SlotStore;
use altech_crypto::codec::Opened;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;

use crate::{cli::SlotCommand, storage::Layer};

/// Execute a slot subcommand against the protected store.
pub async fn handle<S: SlotStore + Clone>(cmd: SlotCommand, layer: &Layer<S>) -> Result<()> {
    match cmd {
        SlotCommand::List => {
            let names = layer
                .gateway
                .store()
                .slot_names()
                .await
                .map_err(|e| eyre!(e.to_string()))?;
            if names.is_empty() {
                println!("No slots yet. Store one with `altech slot put <slot> <json>`.");
            }
            for name in names {
                println!("{name}");
            }
        }
        SlotCommand::Get { slot, raw: true } => match layer.gateway.read(&slot).await {
            Some(value) => println!("{value}"),
            None => println!("Slot {slot} is empty."),
        },
        SlotCommand::Get { slot, raw: false } => {
            let outcome = layer.protected.load_outcome::<Value>(&slot).await;
            println!("{}", describe(&slot, outcome)?);
        }
        SlotCommand::Put { slot, json } => {
            let value: Value =
                serde_json::from_str(&json).map_err(|e| eyre!("value is not JSON: {e}"))?;
            if !layer.protected.save(&slot, &value).await {
                color_eyre::eyre::bail!("slot {slot} was not saved");
            }
            println!("Saved {slot}.");
        }
        SlotCommand::Delete { slot } => {
            if !layer.gateway.remove(&slot).await {
                color_eyre::eyre::bail!("slot {slot} could not be deleted");
            }
            println!("Deleted {slot}.");
        }
    }
    Ok(())
}

fn describe(slot: &str, outcome: Option<Opened<Value>>) -> Result<String> {
    match outcome {
        None => Ok(format!("Slot {slot} is empty.")),
        Some(Opened::Decrypted(value)) => Ok(serde_json::to_string_pretty(&value)?),
        Some(Opened::RecoveredPlaintext(value)) => Ok(format!(
            "{}\n(stored unencrypted)",
            serde_json::to_string_pretty(&value)?
        )),
        Some(Opened::Unreadable) => Err(eyre!(
            "slot {slot} could not be decrypted; it may come from another device"
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use altech_core::signals::RecordingNotifier;
    use serde_json::json;

    use super::*;
    use crate::storage;

    #[tokio::test]
    async fn put_get_delete_cycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layer = storage::test_layer(dir.path(), Arc::new(RecordingNotifier::new()));

        handle(
            SlotCommand::Put {
                slot: "coi-draft".into(),
                json: r#"{"holder":"First Bank"}"#.into(),
            },
            &layer,
        )
        .await
        .expect("put");

        let raw = layer.gateway.read("coi-draft").await.expect("stored");
        assert!(!raw.contains("First Bank"));
        assert_eq!(
            layer.protected.load::<Value>("coi-draft").await,
            Some(json!({"holder": "First Bank"}))
        );

        handle(SlotCommand::Delete { slot: "coi-draft".into() }, &layer)
            .await
            .expect("delete");
        assert_eq!(layer.gateway.read("coi-draft").await, None);
    }

    #[tokio::test]
    async fn put_rejects_invalid_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layer = storage::test_layer(dir.path(), Arc::new(RecordingNotifier::new()));
        let err = handle(
            SlotCommand::Put {
                slot: "app-state".into(),
                json: "{oops".into(),
            },
            &layer,
        )
        .await
        .expect_err("invalid json");
        assert!(err.to_string().contains("not JSON"));
        assert_eq!(layer.gateway.read("app-state").await, None);
    }

    #[test]
    fn describe_marks_plaintext_and_rejects_unreadable() {
        let text = describe("a", Some(Opened::RecoveredPlaintext(json!(1)))).expect("text");
        assert!(text.ends_with("(stored unencrypted)"));
        assert_eq!(describe("a", None).expect("text"), "Slot a is empty.");
        assert!(describe("a", Some(Opened::Unreadable)).is_err());
    }
}
