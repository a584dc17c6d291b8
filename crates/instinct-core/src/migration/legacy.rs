//! Legacy journal adapter.
//!
//! The pre-migration representation of a thread's instincts is an
//! append-only event log (JSON Lines, one tagged event per line) plus an
//! optional point-in-time snapshot (JSON array of records). The adapter
//! contract is deliberately small: read the snapshot, read the events since
//! it, and back the files up. Replaying the events over the snapshot yields
//! the authoritative current state.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{InstinctError, InstinctResult};
use crate::types::{InstinctRecord, InstinctStatus};

/// One entry of the legacy event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LegacyEvent {
    /// A record came into existence with these exact fields.
    Created { record: InstinctRecord },
    /// Fields of an existing record changed.
    Updated { id: Uuid, changes: LegacyChanges },
    /// The record was removed.
    Deleted { id: Uuid },
}

/// Field deltas carried by a legacy update event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InstinctStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LegacyChanges {
    fn apply(&self, record: &mut InstinctRecord) {
        if let Some(trigger) = &self.trigger {
            record.trigger = trigger.clone();
        }
        if let Some(action) = &self.action {
            record.action = action.clone();
        }
        if let Some(domain) = &self.domain {
            record.domain = domain.clone();
        }
        if let Some(confidence) = self.confidence {
            record.confidence = confidence;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(occurrence_count) = self.occurrence_count {
            record.occurrence_count = occurrence_count;
        }
        if let Some(success_rate) = self.success_rate {
            record.success_rate = success_rate;
        }
        if let Some(last_triggered) = self.last_triggered {
            record.last_triggered = Some(last_triggered);
        }
        if let Some(updated_at) = self.updated_at {
            record.updated_at = updated_at;
        }
    }
}

/// Read access to one thread's legacy representation.
pub trait LegacyJournal {
    /// State as of the snapshot, or None when no snapshot was taken.
    fn read_snapshot(&self) -> InstinctResult<Option<Vec<InstinctRecord>>>;

    /// Events appended since the snapshot, in log order.
    fn read_events_since_snapshot(&self) -> InstinctResult<Vec<LegacyEvent>>;

    /// Copy the legacy files to timestamped backups, never overwriting.
    /// Returns the backup paths written.
    fn backup(&self) -> InstinctResult<Vec<PathBuf>>;
}

/// Replay the event log over the snapshot to reconstruct current state.
///
/// Update and delete events referencing unknown ids are logged and skipped;
/// an append-only log compacted at snapshot time can legitimately contain
/// them.
pub fn replay(
    snapshot: Option<Vec<InstinctRecord>>,
    events: Vec<LegacyEvent>,
) -> BTreeMap<Uuid, InstinctRecord> {
    let mut state: BTreeMap<Uuid, InstinctRecord> = snapshot
        .unwrap_or_default()
        .into_iter()
        .map(|record| (record.id, record))
        .collect();

    for event in events {
        match event {
            LegacyEvent::Created { record } => {
                state.insert(record.id, record);
            }
            LegacyEvent::Updated { id, changes } => match state.get_mut(&id) {
                Some(record) => changes.apply(record),
                None => warn!(%id, "Legacy update for unknown record, skipping"),
            },
            LegacyEvent::Deleted { id } => {
                if state.remove(&id).is_none() {
                    warn!(%id, "Legacy delete for unknown record, skipping");
                }
            }
        }
    }

    state
}

/// File-backed legacy journal: `<thread>.events.jsonl` plus an optional
/// `<thread>.snapshot.json` in one directory.
pub struct JsonlLegacyJournal {
    snapshot_path: PathBuf,
    events_path: PathBuf,
}

impl JsonlLegacyJournal {
    /// Journal for a thread under the given legacy directory.
    pub fn for_thread(legacy_dir: impl AsRef<Path>, thread_id: &str) -> Self {
        let dir = legacy_dir.as_ref();
        Self {
            snapshot_path: dir.join(format!("{}.snapshot.json", thread_id)),
            events_path: dir.join(format!("{}.events.jsonl", thread_id)),
        }
    }

    /// Whether any legacy file exists for this thread.
    pub fn exists(&self) -> bool {
        self.snapshot_path.exists() || self.events_path.exists()
    }

    /// Thread identifiers present in a legacy directory.
    pub fn list_threads(legacy_dir: impl AsRef<Path>) -> InstinctResult<Vec<String>> {
        let dir = legacy_dir.as_ref();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut threads = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            for suffix in [".events.jsonl", ".snapshot.json"] {
                if let Some(thread) = name.strip_suffix(suffix) {
                    threads.push(thread.to_string());
                }
            }
        }
        threads.sort();
        threads.dedup();
        Ok(threads)
    }

    fn backup_one(path: &Path) -> InstinctResult<PathBuf> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        let base = format!("{}.bak.{}", path.display(), stamp);

        // Deterministic name, uniqueness loop so an existing backup is never
        // overwritten.
        let mut target = PathBuf::from(&base);
        let mut counter = 1;
        while target.exists() {
            target = PathBuf::from(format!("{}-{}", base, counter));
            counter += 1;
        }

        fs::copy(path, &target).map_err(|e| InstinctError::backup_write(path, e))?;
        debug!(from = %path.display(), to = %target.display(), "Backed up legacy file");
        Ok(target)
    }
}

impl LegacyJournal for JsonlLegacyJournal {
    fn read_snapshot(&self) -> InstinctResult<Option<Vec<InstinctRecord>>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&self.snapshot_path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    fn read_events_since_snapshot(&self) -> InstinctResult<Vec<LegacyEvent>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.events_path)?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            // A corrupt line means the reconstruction cannot be trusted, so
            // the whole read fails rather than silently dropping events.
            let event: LegacyEvent = serde_json::from_str(&line).map_err(|e| {
                InstinctError::parse(format!(
                    "{} line {}: {}",
                    self.events_path.display(),
                    line_no + 1,
                    e
                ))
            })?;
            events.push(event);
        }

        Ok(events)
    }

    fn backup(&self) -> InstinctResult<Vec<PathBuf>> {
        let mut backups = Vec::new();
        for path in [&self.snapshot_path, &self.events_path] {
            if path.exists() {
                backups.push(Self::backup_one(path)?);
            }
        }
        Ok(backups)
    }
}
