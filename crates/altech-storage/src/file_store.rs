use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use altech_core::storage::{SlotReadError, SlotStore, SlotWriteError};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use tempfile::NamedTempFile;
use tracing::instrument;

/// Default budget, matching the ~5 MiB browser local-storage allowance the
/// slot layout was designed around.
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

/// Longest slot name whose encoded file name fits the common 255-byte limit.
pub const MAX_SLOT_NAME_BYTES: usize = 191;

/// File-backed slot store: one file per slot under `root`, written atomically.
///
/// Usage is accounted as slot name plus value bytes. Writes that would push
/// usage past the quota fail with `SlotWriteError::QuotaExceeded`, as does a
/// disk-full condition from the OS.
///
/// File names are the URL-safe base64 of the slot name, so names longer than
/// [`MAX_SLOT_NAME_BYTES`] cannot be stored: writes fail with a
/// `SlotWriteError::Storage` naming the limit and reads report the slot absent.
pub struct FileSlotStore {
    root: PathBuf,
    quota: Option<u64>,
}

impl FileSlotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            quota: Some(DEFAULT_QUOTA_BYTES),
        }
    }

    /// `None` disables the quota (the OS can still report a full disk).
    pub fn with_quota(mut self, quota: Option<u64>) -> Self {
        self.quota = quota;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, slot: &str) -> PathBuf {
        self.root.join(encode_slot(slot))
    }

    /// Slot names with their accounted size, skipping anything that is not a slot file.
    fn entries(&self) -> Result<Vec<(String, u64)>, std::io::Error> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let mut out = Vec::new();
        for entry in dir {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(slot) = entry.file_name().to_str().and_then(decode_slot) else {
                continue;
            };
            let size = entry.metadata()?.len() + slot.len() as u64;
            out.push((slot, size));
        }
        out.sort();
        Ok(out)
    }

    fn check_quota(&self, slot: &str, value: &str) -> Result<(), SlotWriteError> {
        let Some(quota) = self.quota else {
            return Ok(());
        };
        let used: u64 = self
            .entries()
            .map_err(storage_err)?
            .into_iter()
            .filter(|(name, _)| name != slot)
            .map(|(_, size)| size)
            .sum();
        let needed = (slot.len() + value.len()) as u64;
        let available = quota.saturating_sub(used);
        if needed > available {
            return Err(SlotWriteError::QuotaExceeded {
                slot: slot.to_string(),
                needed,
                available,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SlotStore for FileSlotStore {
    #[instrument(skip_all, fields(slot = %slot))]
    async fn raw_get(&self, slot: &str) -> Result<Option<String>, SlotReadError> {
        if slot.len() > MAX_SLOT_NAME_BYTES {
            return Ok(None);
        }
        match fs::read_to_string(self.path_for(slot)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(SlotReadError {
                reason: err.to_string(),
            }),
        }
    }

    #[instrument(skip_all, fields(slot = %slot))]
    async fn raw_set(&self, slot: &str, value: &str) -> Result<(), SlotWriteError> {
        if slot.len() > MAX_SLOT_NAME_BYTES {
            return Err(storage_err(format!(
                "slot name is {} bytes; the file store allows at most {MAX_SLOT_NAME_BYTES}",
                slot.len()
            )));
        }
        fs::create_dir_all(&self.root).map_err(|e| write_err(slot, value, e))?;
        self.check_quota(slot, value)?;

        let mut tmp = NamedTempFile::new_in(&self.root).map_err(|e| write_err(slot, value, e))?;
        tmp.write_all(value.as_bytes())
            .map_err(|e| write_err(slot, value, e))?;
        tmp.flush().map_err(|e| write_err(slot, value, e))?;
        tmp.persist(self.path_for(slot))
            .map_err(|e| write_err(slot, value, e.error))?;
        Ok(())
    }

    #[instrument(skip_all, fields(slot = %slot))]
    async fn raw_delete(&self, slot: &str) -> Result<(), SlotWriteError> {
        if slot.len() > MAX_SLOT_NAME_BYTES {
            return Ok(());
        }
        match fs::remove_file(self.path_for(slot)) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_err(err)),
        }
    }

    async fn slot_names(&self) -> Result<Vec<String>, SlotReadError> {
        self.entries()
            .map(|entries| entries.into_iter().map(|(name, _)| name).collect())
            .map_err(|e| SlotReadError {
                reason: e.to_string(),
            })
    }
}

fn encode_slot(slot: &str) -> String {
    URL_SAFE_NO_PAD.encode(slot)
}

fn decode_slot(file_name: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(file_name).ok()?;
    String::from_utf8(bytes).ok()
}

/// Disk-full conditions surface as quota errors so the user gets the export hint.
fn write_err(slot: &str, value: &str, err: std::io::Error) -> SlotWriteError {
    match err.kind() {
        ErrorKind::StorageFull => SlotWriteError::QuotaExceeded {
            slot: slot.to_string(),
            needed: (slot.len() + value.len()) as u64,
            available: 0,
        },
        _ => storage_err(err),
    }
}

fn storage_err<E: ToString>(err: E) -> SlotWriteError {
    SlotWriteError::Storage {
        reason: err.to_string(),
    }
}
