use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Operator CLI for the local data-protection layer.
#[derive(Parser, Debug)]
#[command(
    name = "altech",
    about = "Encrypted local slot storage with backup and restore",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Encrypt, store, read back and decrypt a probe record.
    Health,
    /// Inspect or edit individual slots.
    #[command(subcommand)]
    Slot(SlotCommand),
    /// Export or restore a backup file.
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SlotCommand {
    /// List slots currently holding a value.
    List,
    /// Print a slot's decrypted JSON (or the stored string with --raw).
    Get {
        slot: String,
        #[arg(long)]
        raw: bool,
    },
    /// Encrypt a JSON value and store it in a slot.
    Put { slot: String, json: String },
    /// Delete a slot.
    Delete { slot: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum BackupCommand {
    /// Write a backup file of every registered slot.
    Export {
        /// Directory for the backup file (defaults to the current directory).
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Restore slots from a backup file, overwriting current values.
    Import {
        file: PathBuf,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
        /// Undo every restored slot if any write fails.
        #[arg(long)]
        all_or_nothing: bool,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
