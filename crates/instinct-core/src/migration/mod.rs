//! Migration from the legacy journal format into per-thread SQLite stores.
//!
//! Per thread the procedure is a small state machine: detect an existing
//! target, back up the legacy files, reconstruct current state by replaying
//! the event log over the snapshot, bulk-load it preserving ids and
//! timestamps, and verify the loaded store field-for-field. Legacy files are
//! never modified or deleted; they stay behind as the recovery path.
//!
//! Re-running is safe: a populated target that verifies cleanly reports
//! [`MigrationOutcome::AlreadyMigrated`] and nothing is written. Run
//! migration before handing the thread's store out to normal traffic; the
//! registry only shares what callers ask it for, so a store opened solely by
//! the engine has no other writers.

mod legacy;

pub use legacy::{JsonlLegacyJournal, LegacyChanges, LegacyEvent, LegacyJournal};

use std::collections::BTreeMap;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{InstinctError, InstinctResult};
use crate::registry::StoreRegistry;
use crate::store::InstinctStore;
use crate::types::{clamp_unit, InstinctRecord};

/// Terminal state of one thread's migration.
#[derive(Debug)]
pub enum MigrationOutcome {
    /// Legacy state was loaded into a fresh target store.
    Migrated { records: usize },
    /// The target store already held exactly the reconstructed state.
    AlreadyMigrated { records: usize },
}

impl MigrationOutcome {
    /// Records present in the target store after migration.
    pub fn records(&self) -> usize {
        match self {
            Self::Migrated { records } | Self::AlreadyMigrated { records } => *records,
        }
    }
}

/// Aggregated result of [`MigrationEngine::migrate_all_threads`].
#[derive(Debug, Default)]
pub struct BulkMigrationReport {
    /// Threads that were freshly migrated.
    pub threads_migrated: usize,
    /// Threads found already migrated and verified.
    pub threads_already_migrated: usize,
    /// Records loaded by fresh migrations.
    pub records_migrated: usize,
    /// Per-thread failures; one bad thread never aborts the batch.
    pub failures: Vec<(String, InstinctError)>,
}

impl BulkMigrationReport {
    /// Total threads processed, including failures.
    pub fn threads_processed(&self) -> usize {
        self.threads_migrated + self.threads_already_migrated + self.failures.len()
    }

    /// Whether every thread reached a terminal success state.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs legacy-to-store migrations against a registry.
pub struct MigrationEngine<'a> {
    registry: &'a StoreRegistry,
}

impl<'a> MigrationEngine<'a> {
    /// Create an engine over the registry that owns the target stores.
    pub fn new(registry: &'a StoreRegistry) -> Self {
        Self { registry }
    }

    /// Migrate one thread from the registry's configured legacy directory.
    pub fn migrate_thread(&self, thread_id: &str) -> InstinctResult<MigrationOutcome> {
        let journal = JsonlLegacyJournal::for_thread(self.registry.legacy_dir()?, thread_id);
        self.migrate_thread_with(&journal, thread_id)
    }

    /// Migrate one thread from an explicit legacy journal.
    pub fn migrate_thread_with<J: LegacyJournal>(
        &self,
        journal: &J,
        thread_id: &str,
    ) -> InstinctResult<MigrationOutcome> {
        // Reconstruct the authoritative state first; it drives both the
        // already-migrated check and the load.
        let expected = reconstruct(journal, thread_id)?;
        let store = self.registry.open_or_create(thread_id)?;

        // Detect: a non-empty target that verifies cleanly means a previous
        // run completed, so re-running is a no-op.
        if store.count()? > 0 {
            verify(store.as_ref(), &expected, thread_id)?;
            debug!(thread_id, records = expected.len(), "Thread already migrated");
            return Ok(MigrationOutcome::AlreadyMigrated {
                records: expected.len(),
            });
        }

        if expected.is_empty() {
            debug!(thread_id, "No legacy records to migrate");
            return Ok(MigrationOutcome::Migrated { records: 0 });
        }

        // Backup before the first write to the target; failure here is fatal
        // for this thread.
        let backups = journal.backup()?;
        debug!(thread_id, backups = backups.len(), "Backed up legacy files");

        // Load: ids, timestamps, and all fields preserved exactly.
        let records: Vec<InstinctRecord> = expected.values().cloned().collect();
        store.import_batch(&records)?;

        // Verify: on mismatch the target is left in place for inspection and
        // the untouched legacy files remain the source of truth.
        verify(store.as_ref(), &expected, thread_id)?;

        info!(thread_id, records = expected.len(), "Migrated thread");
        Ok(MigrationOutcome::Migrated {
            records: expected.len(),
        })
    }

    /// Migrate every thread found in the legacy directory.
    ///
    /// Threads are processed independently; failures are collected in the
    /// report instead of aborting the batch.
    pub fn migrate_all_threads(&self) -> InstinctResult<BulkMigrationReport> {
        let threads = JsonlLegacyJournal::list_threads(self.registry.legacy_dir()?)?;
        let mut report = BulkMigrationReport::default();

        for thread_id in threads {
            match self.migrate_thread(&thread_id) {
                Ok(MigrationOutcome::Migrated { records }) => {
                    report.threads_migrated += 1;
                    report.records_migrated += records;
                }
                Ok(MigrationOutcome::AlreadyMigrated { .. }) => {
                    report.threads_already_migrated += 1;
                }
                Err(e) => {
                    warn!(thread_id = %thread_id, error = %e, "Thread migration failed");
                    report.failures.push((thread_id, e));
                }
            }
        }

        info!(
            migrated = report.threads_migrated,
            already_migrated = report.threads_already_migrated,
            failed = report.failures.len(),
            records = report.records_migrated,
            "Bulk migration finished"
        );
        Ok(report)
    }
}

/// Replay the journal and normalize the result for loading.
fn reconstruct<J: LegacyJournal>(
    journal: &J,
    thread_id: &str,
) -> InstinctResult<BTreeMap<Uuid, InstinctRecord>> {
    let snapshot = journal.read_snapshot()?;
    let events = journal.read_events_since_snapshot()?;
    let mut state = legacy::replay(snapshot, events);

    for record in state.values_mut() {
        if record.thread_id != thread_id {
            return Err(InstinctError::migration_integrity(
                thread_id,
                format!(
                    "legacy record {} belongs to thread '{}'",
                    record.id, record.thread_id
                ),
            ));
        }
        record.confidence = clamp_unit(record.confidence);
        record.success_rate = clamp_unit(record.success_rate);
    }

    Ok(state)
}

/// Compare every migrated record field-for-field against the reconstruction.
fn verify(
    store: &dyn InstinctStore,
    expected: &BTreeMap<Uuid, InstinctRecord>,
    thread_id: &str,
) -> InstinctResult<()> {
    let count = store.count()?;
    if count != expected.len() {
        return Err(InstinctError::migration_integrity(
            thread_id,
            format!("target has {} records, expected {}", count, expected.len()),
        ));
    }

    for (id, expected_record) in expected {
        let actual = match store.get(*id) {
            Ok(record) => record,
            Err(InstinctError::NotFound { .. }) => {
                return Err(InstinctError::migration_integrity(
                    thread_id,
                    format!("record {} missing from target", id),
                ));
            }
            Err(e) => return Err(e),
        };
        if actual != *expected_record {
            return Err(InstinctError::migration_integrity(
                thread_id,
                format!("record {} differs between target and legacy state", id),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryConfig;
    use crate::types::{InstinctSource, InstinctStatus};
    use chrono::Utc;
    use std::path::PathBuf;

    struct MemoryJournal {
        snapshot: Option<Vec<InstinctRecord>>,
        events: Vec<LegacyEvent>,
    }

    impl LegacyJournal for MemoryJournal {
        fn read_snapshot(&self) -> InstinctResult<Option<Vec<InstinctRecord>>> {
            Ok(self.snapshot.clone())
        }

        fn read_events_since_snapshot(&self) -> InstinctResult<Vec<LegacyEvent>> {
            Ok(self.events.clone())
        }

        fn backup(&self) -> InstinctResult<Vec<PathBuf>> {
            Ok(Vec::new())
        }
    }

    fn record(thread_id: &str, confidence: f64) -> InstinctRecord {
        let now = Utc::now();
        InstinctRecord {
            id: Uuid::new_v4(),
            thread_id: thread_id.to_string(),
            trigger: "user mentions deadline".to_string(),
            action: "offer to create calendar reminder".to_string(),
            domain: "scheduling".to_string(),
            source: InstinctSource::Learned,
            confidence,
            status: InstinctStatus::Enabled,
            occurrence_count: 2,
            success_rate: 0.5,
            last_triggered: Some(now - chrono::Duration::days(3)),
            last_decayed: None,
            created_at: now - chrono::Duration::days(20),
            updated_at: now - chrono::Duration::days(3),
        }
    }

    fn registry() -> (tempfile::TempDir, StoreRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let config = RegistryConfig::default()
            .with_base_dir(dir.path().join("stores"))
            .with_legacy_dir(dir.path().join("legacy"));
        let registry = StoreRegistry::new(config).unwrap();
        (dir, registry)
    }

    #[test]
    fn test_migrate_preserves_every_field() {
        let (_dir, registry) = registry();
        let engine = MigrationEngine::new(&registry);

        let original = record("t1", 0.7);
        let journal = MemoryJournal {
            snapshot: Some(vec![original.clone()]),
            events: vec![],
        };

        let outcome = engine.migrate_thread_with(&journal, "t1").unwrap();
        assert!(matches!(outcome, MigrationOutcome::Migrated { records: 1 }));

        let store = registry.open_or_create("t1").unwrap();
        let migrated = store.get(original.id).unwrap();
        assert_eq!(migrated, original);
    }

    #[test]
    fn test_migrate_replays_events_over_snapshot() {
        let (_dir, registry) = registry();
        let engine = MigrationEngine::new(&registry);

        let kept = record("t1", 0.5);
        let removed = record("t1", 0.4);
        let appended = record("t1", 0.9);

        let journal = MemoryJournal {
            snapshot: Some(vec![kept.clone(), removed.clone()]),
            events: vec![
                LegacyEvent::Deleted { id: removed.id },
                LegacyEvent::Created {
                    record: appended.clone(),
                },
                LegacyEvent::Updated {
                    id: kept.id,
                    changes: LegacyChanges {
                        confidence: Some(0.6),
                        ..Default::default()
                    },
                },
            ],
        };

        let outcome = engine.migrate_thread_with(&journal, "t1").unwrap();
        assert_eq!(outcome.records(), 2);

        let store = registry.open_or_create("t1").unwrap();
        assert_eq!(store.get(kept.id).unwrap().confidence, 0.6);
        assert_eq!(store.get(appended.id).unwrap(), appended);
        assert!(matches!(
            store.get(removed.id).unwrap_err(),
            InstinctError::NotFound { .. }
        ));
    }

    #[test]
    fn test_migrate_twice_is_noop() {
        let (_dir, registry) = registry();
        let engine = MigrationEngine::new(&registry);

        let journal = MemoryJournal {
            snapshot: Some(vec![record("t1", 0.7)]),
            events: vec![],
        };

        let first = engine.migrate_thread_with(&journal, "t1").unwrap();
        assert!(matches!(first, MigrationOutcome::Migrated { records: 1 }));

        let second = engine.migrate_thread_with(&journal, "t1").unwrap();
        assert!(matches!(
            second,
            MigrationOutcome::AlreadyMigrated { records: 1 }
        ));

        let store = registry.open_or_create("t1").unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_wrong_thread_record_fails_integrity() {
        let (_dir, registry) = registry();
        let engine = MigrationEngine::new(&registry);

        let journal = MemoryJournal {
            snapshot: Some(vec![record("other-thread", 0.7)]),
            events: vec![],
        };

        let err = engine.migrate_thread_with(&journal, "t1").unwrap_err();
        assert!(matches!(err, InstinctError::MigrationIntegrity { .. }));
    }

    #[test]
    fn test_out_of_range_legacy_confidence_is_clamped() {
        let (_dir, registry) = registry();
        let engine = MigrationEngine::new(&registry);

        let mut dirty = record("t1", 0.5);
        dirty.confidence = 1.7;
        let id = dirty.id;

        let journal = MemoryJournal {
            snapshot: Some(vec![dirty]),
            events: vec![],
        };

        engine.migrate_thread_with(&journal, "t1").unwrap();
        let store = registry.open_or_create("t1").unwrap();
        assert_eq!(store.get(id).unwrap().confidence, 1.0);
    }

    #[test]
    fn test_tampered_target_fails_verification_on_rerun() {
        let (_dir, registry) = registry();
        let engine = MigrationEngine::new(&registry);

        let original = record("t1", 0.7);
        let journal = MemoryJournal {
            snapshot: Some(vec![original.clone()]),
            events: vec![],
        };
        engine.migrate_thread_with(&journal, "t1").unwrap();

        // Diverge the target from the legacy state.
        let store = registry.open_or_create("t1").unwrap();
        store.adjust_confidence(original.id, 0.1).unwrap();

        let err = engine.migrate_thread_with(&journal, "t1").unwrap_err();
        assert!(matches!(err, InstinctError::MigrationIntegrity { .. }));
    }

    #[test]
    fn test_empty_journal_migrates_zero_records() {
        let (_dir, registry) = registry();
        let engine = MigrationEngine::new(&registry);

        let journal = MemoryJournal {
            snapshot: None,
            events: vec![],
        };
        let outcome = engine.migrate_thread_with(&journal, "t1").unwrap();
        assert_eq!(outcome.records(), 0);
    }
}
