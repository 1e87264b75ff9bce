use std::collections::BTreeMap;

use altech_core::storage::SlotReadError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const SNAPSHOT_VERSION: u32 = 1;
pub const DEFAULT_APP_NAME: &str = "Altech";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid backup file: {0}")]
    Malformed(String),
    #[error("backup version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error(transparent)]
    Read(#[from] SlotReadError),
    #[error("backup file could not be written: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotMeta {
    pub version: u32,
    /// ISO-8601 export time, kept as the exact text found in the file.
    #[serde(rename = "exportedAt")]
    pub exported_at: String,
    pub app: String,
}

impl Default for SnapshotMeta {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            exported_at: String::new(),
            app: String::new(),
        }
    }
}

impl SnapshotMeta {
    /// Read `_meta` without insisting on field types: hand-edited or older
    /// files may carry a numeric `exportedAt` or a quoted `version`.
    fn from_fields(fields: &Map<String, Value>) -> Self {
        let version = match fields.get("version") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
        .unwrap_or(SNAPSHOT_VERSION);

        Self {
            version,
            exported_at: text_field(fields, "exportedAt"),
            app: text_field(fields, "app"),
        }
    }
}

fn text_field(fields: &Map<String, Value>, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Portable backup document: `{"_meta": {...}, "data": {slot: raw}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    #[serde(rename = "_meta")]
    pub meta: SnapshotMeta,
    pub data: BTreeMap<String, String>,
}

impl BackupSnapshot {
    pub fn new(app: impl Into<String>, exported_at: DateTime<Utc>) -> Self {
        Self {
            meta: SnapshotMeta {
                version: SNAPSHOT_VERSION,
                exported_at: exported_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                app: app.into(),
            },
            data: BTreeMap::new(),
        }
    }

    /// Pretty-printed JSON, the format written to backup files.
    pub fn to_json_pretty(&self) -> Result<String, BackupError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a backup file. Any structural problem is reported
    /// before a caller could write anything.
    pub fn parse(text: &str) -> Result<Self, BackupError> {
        let doc: Value = serde_json::from_str(text)?;

        let Some(Value::Object(raw_meta)) = doc.get("_meta") else {
            return Err(BackupError::Malformed("missing _meta".into()));
        };
        let Some(Value::Object(raw_data)) = doc.get("data") else {
            return Err(BackupError::Malformed("missing data".into()));
        };

        let meta = SnapshotMeta::from_fields(raw_meta);
        if meta.version > SNAPSHOT_VERSION {
            return Err(BackupError::UnsupportedVersion {
                found: meta.version,
                supported: SNAPSHOT_VERSION,
            });
        }

        let mut data = BTreeMap::new();
        for (slot, value) in raw_data {
            let Value::String(raw) = value else {
                return Err(BackupError::Malformed(format!(
                    "slot {slot} does not hold a string"
                )));
            };
            data.insert(slot.clone(), raw.clone());
        }

        Ok(Self { meta, data })
    }
}

/// `altech-backup-YYYY-MM-DD.json`
pub fn file_name(exported_at: DateTime<Utc>) -> String {
    format!("altech-backup-{}.json", exported_at.format("%Y-%m-%d"))
}
