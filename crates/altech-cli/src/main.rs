mod backup;
mod cli;
mod config;
mod slots;
mod storage;
mod terminal;

use std::sync::Arc;

use altech_core::storage::SlotStore;
use altech_crypto::codec::Opened;
use clap::Parser;
use color_eyre::Result;
use serde_json::{json, Value};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{cli::ConfigCommand, storage::Layer, terminal::TerminalNotifier};

const HEALTH_PROBE_SLOT: &str = "health-probe";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        cli::Command::Version => print_version(),
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
        cli::Command::Health => {
            let layer = storage::open(&config, Arc::new(TerminalNotifier))?;
            let encrypted = run_store_health(&layer).await?;
            let mode = if encrypted { "encrypted" } else { "plaintext fallback" };
            println!("Storage: ok ({mode})");
        }
        cli::Command::Slot(cmd) => {
            let layer = storage::open(&config, Arc::new(TerminalNotifier))?;
            slots::handle(cmd, &layer).await?
        }
        cli::Command::Backup(cmd) => {
            let layer = storage::open(&config, Arc::new(TerminalNotifier))?;
            backup::handle(cmd, &config, &layer).await?
        }
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("altech {}", env!("CARGO_PKG_VERSION"));
}

/// Round-trips a probe record through encrypt, persist, read and decrypt.
/// Returns whether the record was actually encrypted.
async fn run_store_health<S: SlotStore + Clone>(layer: &Layer<S>) -> Result<bool> {
    let payload = json!({"probe": "ok"});
    if !layer.protected.save(HEALTH_PROBE_SLOT, &payload).await {
        color_eyre::eyre::bail!("storage write failed");
    }
    let outcome = layer.protected.load_outcome::<Value>(HEALTH_PROBE_SLOT).await;
    layer.gateway.remove(HEALTH_PROBE_SLOT).await;

    match outcome {
        Some(Opened::Decrypted(value)) if value == payload => Ok(true),
        Some(Opened::RecoveredPlaintext(value)) if value == payload => {
            warn!("encryption unavailable; records are stored as plaintext");
            Ok(false)
        }
        _ => color_eyre::eyre::bail!("storage round-trip failed"),
    }
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use altech_core::signals::RecordingNotifier;

    use super::*;

    #[tokio::test]
    async fn health_check_with_test_store_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layer = storage::test_layer(dir.path(), Arc::new(RecordingNotifier::new()));
        let encrypted = run_store_health(&layer)
            .await
            .expect("health check should succeed");
        assert!(encrypted);
        assert_eq!(layer.gateway.read(HEALTH_PROBE_SLOT).await, None);
    }
}
