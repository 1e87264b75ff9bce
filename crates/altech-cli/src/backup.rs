use std::{fs, sync::Arc};

use altech_backup::manager::{BackupManager, ImportMode, ImportOutcome};
use altech_core::storage::SlotStore;
use color_eyre::{eyre::eyre, Result};

use crate::{
    cli::BackupCommand,
    config::Config,
    storage::Layer,
    terminal::{NextRunReload, StdinConfirm},
};

/// Execute a backup subcommand.
pub async fn handle<S: SlotStore + Clone>(
    cmd: BackupCommand,
    config: &Config,
    layer: &Layer<S>,
) -> Result<()> {
    match cmd {
        BackupCommand::Export { out } => {
            let dir = match out {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            let path = manager(config, layer, false)
                .export_to_dir(&dir)
                .await
                .map_err(|e| eyre!(e.to_string()))?;
            println!("{}", path.display());
        }
        BackupCommand::Import {
            file,
            yes,
            all_or_nothing,
        } => {
            let contents = fs::read_to_string(&file)
                .map_err(|e| eyre!("cannot read {}: {e}", file.display()))?;
            let mode = if all_or_nothing {
                ImportMode::AllOrNothing
            } else {
                ImportMode::BestEffort
            };
            let outcome = manager(config, layer, yes)
                .import_snapshot(&contents, mode)
                .await
                .map_err(|e| eyre!(e.to_string()))?;
            match outcome {
                ImportOutcome::Cancelled => println!("Restore cancelled."),
                ImportOutcome::Completed(report) => {
                    println!("Restored {} of {} slots.", report.restored, report.attempted);
                    for slot in &report.failed {
                        println!("    not restored: {slot}");
                    }
                }
            }
        }
    }
    Ok(())
}

fn manager<S: SlotStore + Clone>(
    config: &Config,
    layer: &Layer<S>,
    assume_yes: bool,
) -> BackupManager<S> {
    let manager = BackupManager::new(
        layer.gateway.clone(),
        config.registry(),
        Arc::new(StdinConfirm { assume_yes }),
        Arc::new(NextRunReload),
    );
    match &config.app_name {
        Some(name) => manager.with_app_name(name),
        None => manager,
    }
}
