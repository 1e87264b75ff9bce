use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use altech_core::{
    registry::SlotRegistry,
    signals::{Confirm, Reinitialize},
    storage::SlotStore,
};
use altech_storage::gateway::PersistenceGateway;
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{error, info, instrument, warn};

use crate::snapshot::{self, BackupError, BackupSnapshot, DEFAULT_APP_NAME};

/// How an import reacts to a failed slot write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImportMode {
    /// Keep every slot that was written; report how many.
    #[default]
    BestEffort,
    /// On the first failed write, put every touched slot back the way it was.
    AllOrNothing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub restored: usize,
    pub attempted: usize,
    /// Slots whose write failed, in attempt order.
    pub failed: Vec<String>,
    pub rolled_back: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The user declined; nothing was written.
    Cancelled,
    Completed(ImportReport),
}

/// Exports and restores the registered slots through the persistence gateway.
pub struct BackupManager<S: SlotStore> {
    gateway: Arc<PersistenceGateway<S>>,
    registry: SlotRegistry,
    app_name: String,
    confirm: Arc<dyn Confirm>,
    reinit: Arc<dyn Reinitialize>,
}

impl<S: SlotStore> BackupManager<S> {
    pub fn new(
        gateway: Arc<PersistenceGateway<S>>,
        registry: SlotRegistry,
        confirm: Arc<dyn Confirm>,
        reinit: Arc<dyn Reinitialize>,
    ) -> Self {
        Self {
            gateway,
            registry,
            app_name: DEFAULT_APP_NAME.to_string(),
            confirm,
            reinit,
        }
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn registry(&self) -> &SlotRegistry {
        &self.registry
    }

    /// Collect the raw value of every registered or prefix-matched slot that is present.
    /// Slots that cannot be read are logged and left out.
    pub async fn export_snapshot(&self) -> Result<BackupSnapshot, BackupError> {
        self.export_snapshot_at(Utc::now()).await
    }

    #[instrument(skip_all)]
    async fn export_snapshot_at(&self, now: DateTime<Utc>) -> Result<BackupSnapshot, BackupError> {
        let store = self.gateway.store();
        let present = match store.slot_names().await {
            Ok(names) => names,
            Err(err) => {
                warn!("slot discovery failed, exporting registered slots only: {err}");
                Vec::new()
            }
        };

        let mut snapshot = BackupSnapshot::new(&self.app_name, now);
        let mut skipped = 0usize;
        for slot in self.registry.resolve(present.iter().map(String::as_str)) {
            match store.raw_get(&slot).await {
                Ok(Some(raw)) => {
                    snapshot.data.insert(slot, raw);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(slot = %slot, "skipping unreadable slot: {err}");
                    skipped += 1;
                }
            }
        }
        info!(slots = snapshot.data.len(), skipped, "snapshot collected");
        Ok(snapshot)
    }

    /// Write a snapshot file into `dir` and return its path.
    pub async fn export_to_dir(&self, dir: &Path) -> Result<PathBuf, BackupError> {
        let result = self.write_snapshot_file(dir, Utc::now()).await;
        match &result {
            Ok(path) => {
                info!(path = %path.display(), "backup exported");
                self.toast("Backup exported!");
            }
            Err(err) => {
                error!("backup export failed: {err}");
                self.toast(&format!("Backup failed: {err}"));
            }
        }
        result
    }

    async fn write_snapshot_file(
        &self,
        dir: &Path,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, BackupError> {
        let snapshot = self.export_snapshot_at(now).await?;
        let path = dir.join(snapshot::file_name(now));
        write_atomically(&path, snapshot.to_json_pretty()?.as_bytes())?;
        Ok(path)
    }

    /// Restore a backup file. Validation happens before any write; the user
    /// must confirm; slots are then written one by one (not atomically unless
    /// `mode` is `AllOrNothing`) and the application is reinitialized.
    #[instrument(skip_all, fields(?mode))]
    pub async fn import_snapshot(
        &self,
        contents: &str,
        mode: ImportMode,
    ) -> Result<ImportOutcome, BackupError> {
        let snapshot = match BackupSnapshot::parse(contents) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("rejected backup: {err}");
                match &err {
                    BackupError::Parse(reason) => {
                        self.toast(&format!("Failed to read backup: {reason}"))
                    }
                    _ => self.toast("Invalid backup file"),
                }
                return Err(err);
            }
        };

        let prompt = format!(
            "Restore backup from {}?\nThis will overwrite current data.",
            snapshot.meta.exported_at
        );
        if !self.confirm.confirm(&prompt) {
            info!("restore cancelled by user");
            return Ok(ImportOutcome::Cancelled);
        }

        let report = match mode {
            ImportMode::BestEffort => self.write_all(&snapshot).await,
            ImportMode::AllOrNothing => self.write_all_or_nothing(&snapshot).await?,
        };

        if report.rolled_back {
            self.toast("Restore failed; no changes were kept.");
        } else {
            self.toast(&format!("Restored {} items. Reloading...", report.restored));
            self.reinit.reinitialize();
        }
        info!(
            restored = report.restored,
            attempted = report.attempted,
            rolled_back = report.rolled_back,
            "restore finished"
        );
        Ok(ImportOutcome::Completed(report))
    }

    async fn write_all(&self, snapshot: &BackupSnapshot) -> ImportReport {
        let mut report = ImportReport::default();
        for (slot, raw) in &snapshot.data {
            report.attempted += 1;
            if self.gateway.persist(slot, raw).await {
                report.restored += 1;
            } else {
                report.failed.push(slot.clone());
            }
        }
        report
    }

    async fn write_all_or_nothing(
        &self,
        snapshot: &BackupSnapshot,
    ) -> Result<ImportReport, BackupError> {
        let store = self.gateway.store();

        // Capture first so a failed read aborts before anything changes.
        let mut prior = Vec::with_capacity(snapshot.data.len());
        for slot in snapshot.data.keys() {
            prior.push((slot.as_str(), store.raw_get(slot).await?));
        }

        let mut report = ImportReport::default();
        for (slot, raw) in &snapshot.data {
            report.attempted += 1;
            if self.gateway.persist(slot, raw).await {
                report.restored += 1;
                continue;
            }
            report.failed.push(slot.clone());
            self.roll_back(&prior[..report.restored]).await;
            report.restored = 0;
            report.rolled_back = true;
            break;
        }
        Ok(report)
    }

    async fn roll_back(&self, written: &[(&str, Option<String>)]) {
        let store = self.gateway.store();
        for (slot, previous) in written {
            let result = match previous {
                Some(value) => store.raw_set(slot, value).await,
                None => store.raw_delete(slot).await,
            };
            if let Err(err) = result {
                error!(slot, "rollback could not restore slot: {err}");
            }
        }
    }

    fn toast(&self, message: &str) {
        self.gateway.notifier().toast(message);
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), BackupError> {
    let parent = path
        .parent()
        .ok_or_else(|| BackupError::Malformed("backup path has no parent directory".into()))?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use altech_core::{
        signals::{AutoConfirm, CountingReinitializer, RecordingNotifier},
        storage::InMemorySlotStore,
    };
    use altech_storage::{file_store::FileSlotStore, gateway::QUOTA_WARNING};

    use super::*;

    struct Fixture {
        store: InMemorySlotStore,
        notifier: RecordingNotifier,
        reload: CountingReinitializer,
        manager: BackupManager<InMemorySlotStore>,
    }

    fn fixture(store: InMemorySlotStore, confirm: bool) -> Fixture {
        let notifier = RecordingNotifier::new();
        let reload = CountingReinitializer::default();
        let gateway = Arc::new(PersistenceGateway::new(
            store.clone(),
            Arc::new(notifier.clone()),
        ));
        let manager = BackupManager::new(
            gateway,
            SlotRegistry::default(),
            Arc::new(AutoConfirm(confirm)),
            Arc::new(reload.clone()),
        );
        Fixture {
            store,
            notifier,
            reload,
            manager,
        }
    }

    fn five_slot_backup() -> String {
        let mut snapshot = BackupSnapshot::new("Altech", Utc::now());
        for slot in ["s1", "s2", "s3", "s4", "s5"] {
            snapshot.data.insert(slot.into(), "aaaaaaaa".into());
        }
        snapshot.to_json_pretty().expect("json")
    }

    #[tokio::test]
    async fn export_collects_registered_and_prefixed_slots_only() {
        let store = InMemorySlotStore::new();
        store.raw_set("app-state", "enc1").await.expect("seed");
        store.raw_set("device-secret", "ab12").await.expect("seed");
        store.raw_set("altech-export-history-7", "log").await.expect("seed");
        store.raw_set("cgl-state", "{}").await.expect("seed");
        store.raw_set("scratch", "ignored").await.expect("seed");
        let fx = fixture(store, true);

        let snapshot = fx.manager.export_snapshot().await.expect("export");
        let slots: Vec<&str> = snapshot.data.keys().map(String::as_str).collect();
        assert_eq!(
            slots,
            vec!["altech-export-history-7", "app-state", "cgl-state", "device-secret"]
        );
        assert_eq!(snapshot.data["app-state"], "enc1");
        assert_eq!(snapshot.meta.app, "Altech");
        assert_eq!(snapshot.meta.version, 1);
    }

    #[tokio::test]
    async fn export_to_dir_writes_named_file_and_toasts() {
        let store = InMemorySlotStore::new();
        store.raw_set("email-drafts", "[]").await.expect("seed");
        let fx = fixture(store, true);
        let dir = tempfile::tempdir().expect("tempdir");

        let path = fx.manager.export_to_dir(dir.path()).await.expect("export");
        let name = path.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("altech-backup-") && name.ends_with(".json"));

        let written = std::fs::read_to_string(&path).expect("read");
        let snapshot = BackupSnapshot::parse(&written).expect("parse");
        assert_eq!(snapshot.data["email-drafts"], "[]");
        assert_eq!(fx.notifier.messages(), vec!["Backup exported!"]);
    }

    #[tokio::test]
    async fn import_restores_and_reloads() {
        let fx = fixture(InMemorySlotStore::new(), true);
        let outcome = fx
            .manager
            .import_snapshot(&five_slot_backup(), ImportMode::BestEffort)
            .await
            .expect("import");

        let ImportOutcome::Completed(report) = outcome else {
            panic!("expected completed import");
        };
        assert_eq!(report.restored, 5);
        assert!(report.failed.is_empty());
        assert_eq!(
            fx.store.raw_get("s3").await.expect("get").as_deref(),
            Some("aaaaaaaa")
        );
        assert_eq!(fx.reload.count(), 1);
        assert_eq!(
            fx.notifier.messages().last().map(String::as_str),
            Some("Restored 5 items. Reloading...")
        );
    }

    #[tokio::test]
    async fn partial_import_reports_only_successful_writes() {
        // Each slot costs 10 bytes; only three fit.
        let fx = fixture(InMemorySlotStore::with_capacity(30), true);
        let outcome = fx
            .manager
            .import_snapshot(&five_slot_backup(), ImportMode::BestEffort)
            .await
            .expect("import must not fail");

        let ImportOutcome::Completed(report) = outcome else {
            panic!("expected completed import");
        };
        assert_eq!(report.restored, 3);
        assert_eq!(report.attempted, 5);
        assert_eq!(report.failed, vec!["s4", "s5"]);
        assert!(!report.rolled_back);
        assert_eq!(
            fx.store.raw_get("s3").await.expect("get").as_deref(),
            Some("aaaaaaaa")
        );
        assert_eq!(fx.store.raw_get("s4").await.expect("get"), None);

        let messages = fx.notifier.messages();
        assert_eq!(messages.iter().filter(|m| *m == QUOTA_WARNING).count(), 2);
        assert_eq!(
            messages.last().map(String::as_str),
            Some("Restored 3 items. Reloading...")
        );
        assert_eq!(fx.reload.count(), 1);
    }

    #[tokio::test]
    async fn all_or_nothing_rolls_back_on_failure() {
        let store = InMemorySlotStore::with_capacity(30);
        store.raw_set("s1", "old").await.expect("seed");
        let fx = fixture(store, true);

        let outcome = fx
            .manager
            .import_snapshot(&five_slot_backup(), ImportMode::AllOrNothing)
            .await
            .expect("import");

        let ImportOutcome::Completed(report) = outcome else {
            panic!("expected completed import");
        };
        assert!(report.rolled_back);
        assert_eq!(report.restored, 0);
        assert_eq!(report.failed, vec!["s4"]);
        assert_eq!(fx.store.raw_get("s1").await.expect("get").as_deref(), Some("old"));
        assert_eq!(fx.store.raw_get("s2").await.expect("get"), None);
        assert_eq!(fx.store.raw_get("s3").await.expect("get"), None);
        assert_eq!(fx.reload.count(), 0);
    }

    #[tokio::test]
    async fn malformed_backup_aborts_before_writes() {
        let fx = fixture(InMemorySlotStore::new(), true);
        let err = fx
            .manager
            .import_snapshot(r#"{"data": {"app-state": "x"}}"#, ImportMode::BestEffort)
            .await
            .expect_err("missing _meta");

        assert!(matches!(err, BackupError::Malformed(_)));
        assert!(fx.store.slot_names().await.expect("names").is_empty());
        assert_eq!(fx.notifier.messages(), vec!["Invalid backup file"]);
        assert_eq!(fx.reload.count(), 0);
    }

    #[tokio::test]
    async fn unparseable_backup_reports_reason() {
        let fx = fixture(InMemorySlotStore::new(), true);
        let err = fx
            .manager
            .import_snapshot("definitely not json", ImportMode::BestEffort)
            .await
            .expect_err("bad json");

        assert!(matches!(err, BackupError::Parse(_)));
        let messages = fx.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Failed to read backup: "));
    }

    #[tokio::test]
    async fn declined_confirmation_writes_nothing() {
        let fx = fixture(InMemorySlotStore::new(), false);
        let outcome = fx
            .manager
            .import_snapshot(&five_slot_backup(), ImportMode::BestEffort)
            .await
            .expect("import");

        assert_eq!(outcome, ImportOutcome::Cancelled);
        assert!(fx.store.slot_names().await.expect("names").is_empty());
        assert_eq!(fx.reload.count(), 0);
        assert!(fx.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn earlier_release_slots_survive_restore_then_export() {
        let fx = fixture(InMemorySlotStore::new(), true);
        let earlier = r#"{
          "_meta": {"version": 1, "exportedAt": "2025-11-02T18:00:00.000Z", "app": "Altech"},
          "data": {"altech_v6": "{\"a\":1}", "altech_export_history": "[]", "cgl_state": "abc"}
        }"#;
        fx.manager
            .import_snapshot(earlier, ImportMode::BestEffort)
            .await
            .expect("import");

        let snapshot = fx.manager.export_snapshot().await.expect("export");
        let slots: Vec<&str> = snapshot.data.keys().map(String::as_str).collect();
        assert_eq!(slots, vec!["altech_export_history", "altech_v6", "cgl_state"]);
        assert_eq!(snapshot.data["cgl_state"], "abc");
    }

    #[tokio::test]
    async fn export_skips_unreadable_slot_and_keeps_the_rest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSlotStore::new(dir.path());
        store.raw_set("coi-draft", "draft").await.expect("seed");
        let corrupt = std::fs::read_dir(dir.path())
            .expect("read dir")
            .next()
            .expect("one slot file")
            .expect("entry")
            .path();
        std::fs::write(&corrupt, [0xff, 0xfe]).expect("corrupt slot file");
        store.raw_set("app-state", "enc1").await.expect("seed");

        let gateway = Arc::new(PersistenceGateway::new(
            store,
            Arc::new(RecordingNotifier::new()),
        ));
        let manager = BackupManager::new(
            gateway,
            SlotRegistry::default(),
            Arc::new(AutoConfirm(true)),
            Arc::new(CountingReinitializer::default()),
        );

        let snapshot = manager.export_snapshot().await.expect("export must not fail");
        assert_eq!(snapshot.data.len(), 1);
        assert_eq!(snapshot.data["app-state"], "enc1");
    }
}
