//! End-to-end migration: legacy journal files -> per-thread SQLite stores.

use std::fs;
use std::io::Write;

use chrono::{Duration, Utc};
use uuid::Uuid;

use instinct_core::{
    InstinctDraft, InstinctFilter, InstinctRecord, InstinctSource, InstinctStatus, InstinctStore,
    LegacyChanges, LegacyEvent, MigrationEngine, RegistryConfig, StoreRegistry,
};

fn legacy_record(thread_id: &str, trigger: &str, confidence: f64, days_old: i64) -> InstinctRecord {
    let created = Utc::now() - Duration::days(days_old);
    InstinctRecord {
        id: Uuid::new_v4(),
        thread_id: thread_id.to_string(),
        trigger: trigger.to_string(),
        action: "offer to create calendar reminder".to_string(),
        domain: "scheduling".to_string(),
        source: InstinctSource::Learned,
        confidence,
        status: InstinctStatus::Enabled,
        occurrence_count: 4,
        success_rate: 0.75,
        last_triggered: Some(created + Duration::days(1)),
        last_decayed: None,
        created_at: created,
        updated_at: created + Duration::days(1),
    }
}

fn write_legacy_thread(
    legacy_dir: &std::path::Path,
    thread_id: &str,
    snapshot: &[InstinctRecord],
    events: &[LegacyEvent],
) {
    fs::create_dir_all(legacy_dir).unwrap();
    fs::write(
        legacy_dir.join(format!("{}.snapshot.json", thread_id)),
        serde_json::to_string(snapshot).unwrap(),
    )
    .unwrap();

    let mut log = fs::File::create(legacy_dir.join(format!("{}.events.jsonl", thread_id))).unwrap();
    for event in events {
        writeln!(log, "{}", serde_json::to_string(event).unwrap()).unwrap();
    }
}

fn registry_in(dir: &tempfile::TempDir) -> StoreRegistry {
    let config = RegistryConfig::default()
        .with_base_dir(dir.path().join("stores"))
        .with_legacy_dir(dir.path().join("legacy"));
    StoreRegistry::new(config).unwrap()
}

#[test]
fn migrates_threads_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let legacy_dir = dir.path().join("legacy");

    let alpha_a = legacy_record("alpha", "user mentions deadline", 0.7, 20);
    let alpha_b = legacy_record("alpha", "user asks for summary", 0.5, 10);
    let beta = legacy_record("beta", "user shares a link", 0.4, 5);

    write_legacy_thread(
        &legacy_dir,
        "alpha",
        std::slice::from_ref(&alpha_a),
        &[
            LegacyEvent::Created {
                record: alpha_b.clone(),
            },
            LegacyEvent::Updated {
                id: alpha_a.id,
                changes: LegacyChanges {
                    confidence: Some(0.8),
                    ..Default::default()
                },
            },
        ],
    );
    write_legacy_thread(
        &legacy_dir,
        "beta",
        &[],
        &[LegacyEvent::Created {
            record: beta.clone(),
        }],
    );

    let registry = registry_in(&dir);
    let engine = MigrationEngine::new(&registry);

    let report = engine.migrate_all_threads().unwrap();
    assert!(report.is_success());
    assert_eq!(report.threads_migrated, 2);
    assert_eq!(report.records_migrated, 3);

    // Every field except the updated confidence survives exactly.
    let alpha = registry.open_or_create("alpha").unwrap();
    let migrated_a = alpha.get(alpha_a.id).unwrap();
    assert_eq!(migrated_a.confidence, 0.8);
    assert_eq!(migrated_a.trigger, alpha_a.trigger);
    assert_eq!(migrated_a.created_at, alpha_a.created_at);
    assert_eq!(migrated_a.last_triggered, alpha_a.last_triggered);
    assert_eq!(alpha.get(alpha_b.id).unwrap(), alpha_b);
    assert_eq!(registry.open_or_create("beta").unwrap().get(beta.id).unwrap(), beta);

    // Legacy files are untouched, backups are written alongside them.
    assert!(legacy_dir.join("alpha.snapshot.json").exists());
    assert!(legacy_dir.join("alpha.events.jsonl").exists());
    let backups = fs::read_dir(&legacy_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".bak."))
        .count();
    assert_eq!(backups, 4);

    // Second run: no-ops, no duplicates, same counts.
    let rerun = engine.migrate_all_threads().unwrap();
    assert!(rerun.is_success());
    assert_eq!(rerun.threads_migrated, 0);
    assert_eq!(rerun.threads_already_migrated, 2);
    assert_eq!(alpha.count().unwrap(), 2);
}

#[test]
fn one_corrupt_thread_does_not_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let legacy_dir = dir.path().join("legacy");

    let good = legacy_record("good", "user mentions deadline", 0.6, 3);
    write_legacy_thread(
        &legacy_dir,
        "good",
        &[],
        &[LegacyEvent::Created {
            record: good.clone(),
        }],
    );
    fs::write(legacy_dir.join("bad.events.jsonl"), "this is not json\n").unwrap();

    let registry = registry_in(&dir);
    let report = MigrationEngine::new(&registry).migrate_all_threads().unwrap();

    assert!(!report.is_success());
    assert_eq!(report.threads_migrated, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "bad");
    assert_eq!(report.threads_processed(), 2);

    let store = registry.open_or_create("good").unwrap();
    assert_eq!(store.get(good.id).unwrap(), good);
}

#[test]
fn migrated_instincts_decay_and_reinforce_like_native_ones() {
    let dir = tempfile::tempdir().unwrap();
    let legacy_dir = dir.path().join("legacy");

    // One half-life old, no reinforcement since.
    let mut aged = legacy_record("t", "user mentions deadline", 0.8, 30);
    aged.last_triggered = None;
    aged.updated_at = aged.created_at;
    write_legacy_thread(
        &legacy_dir,
        "t",
        std::slice::from_ref(&aged),
        &[],
    );

    let registry = registry_in(&dir);
    MigrationEngine::new(&registry).migrate_all_threads().unwrap();
    let store = registry.open_or_create("t").unwrap();

    let decayed = store.list(&InstinctFilter::new(), true).unwrap();
    assert!((decayed[0].confidence - 0.4).abs() < 1e-6);

    // Reinforcement resets the decay clock for migrated records too.
    store.reinforce(aged.id, true).unwrap();
    let fresh = store.list(&InstinctFilter::new(), true).unwrap();
    assert!((fresh[0].confidence - 0.85).abs() < 1e-6);
}

#[test]
fn scheduling_scenario_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(&dir);
    let store = registry.open_or_create("scenario").unwrap();

    let instinct = store
        .create(InstinctDraft::new(
            "user mentions deadline",
            "offer to create calendar reminder",
            "scheduling",
            InstinctSource::Learned,
            0.6,
        ))
        .unwrap();

    let mut reinforced = instinct.clone();
    for _ in 0..3 {
        reinforced = store.reinforce(instinct.id, true).unwrap();
    }
    assert_eq!(reinforced.occurrence_count, 3);
    assert_eq!(reinforced.success_rate, 1.0);
    assert!((reinforced.confidence - 0.75).abs() < 1e-12);

    // The instinct is findable by lexical match from the channel adapter.
    let matches = store.match_instincts("there is a deadline coming up").unwrap();
    assert_eq!(matches[0].id, instinct.id);
}
