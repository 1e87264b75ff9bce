use std::{
    fs,
    path::{Path, PathBuf},
};

use altech_core::registry::SlotRegistry;
use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

/// User-level configuration loaded from `~/.config/altech/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the slot directory.
    pub data_dir: Option<PathBuf>,
    /// Storage budget in bytes; defaults to the file store's 5 MiB.
    pub quota_bytes: Option<u64>,
    /// `app` value stamped into exported backups.
    pub app_name: Option<String>,
    pub backup: Option<BackupConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BackupConfig {
    /// Replaces the built-in list of backed-up slots.
    pub slots: Option<Vec<String>>,
    /// Replaces the built-in dynamic-discovery prefixes.
    pub prefixes: Option<Vec<String>>,
}

impl Config {
    pub fn registry(&self) -> SlotRegistry {
        let mut registry = SlotRegistry::default();
        if let Some(backup) = &self.backup {
            if let Some(slots) = &backup.slots {
                registry.slots = slots.clone();
            }
            if let Some(prefixes) = &backup.prefixes {
                registry.prefixes = prefixes.clone();
            }
        }
        registry
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("altech").join("config.toml"))
}

/// Write `config` to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
