//! Instinct storage trait and SQLite implementation.
//!
//! Each store handle owns one thread's instincts. Writes are serialized
//! through a single connection mutex so running averages and the
//! strictly-increasing `updated_at` are always computed from a consistent
//! prior state. Read-time decay never touches persisted state; use
//! [`InstinctStore::commit_decay`] to persist decayed values.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{named_params, params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use crate::decay::{decayed_at, DecayConfig};
use crate::error::{InstinctError, InstinctResult};
use crate::types::{clamp_unit, InstinctDraft, InstinctFilter, InstinctRecord, InstinctStatus};

/// Confidence nudge applied by one reinforcement.
const REINFORCE_STEP: f64 = 0.05;

/// Trait for instinct storage operations, scoped to a single thread.
pub trait InstinctStore: Send + Sync {
    /// The conversation thread this store belongs to.
    fn thread_id(&self) -> &str;

    /// Create a new instinct from a draft. Assigns the id, sets
    /// `created_at = updated_at = now`, zero occurrences, success rate 1.0,
    /// status enabled.
    fn create(&self, draft: InstinctDraft) -> InstinctResult<InstinctRecord>;

    /// Get an instinct by id.
    fn get(&self, id: Uuid) -> InstinctResult<InstinctRecord>;

    /// List instincts matching the filter, ordered by confidence descending
    /// with ties broken by most-recently-updated first.
    ///
    /// With `apply_decay`, returned confidences are decayed against the
    /// current time; the persisted base values are unchanged. The
    /// `min_confidence` filter applies to the returned values.
    fn list(&self, filter: &InstinctFilter, apply_decay: bool) -> InstinctResult<Vec<InstinctRecord>>;

    /// Add a delta to stored confidence, clamped to [0.0, 1.0].
    fn adjust_confidence(&self, id: Uuid, delta: f64) -> InstinctResult<InstinctRecord>;

    /// Set the status from its string form ("enabled" / "disabled").
    fn set_status(&self, id: Uuid, status: &str) -> InstinctResult<InstinctRecord>;

    /// Record one use of the instinct: bumps the occurrence count, folds the
    /// outcome into the running success average, resets the decay clock, and
    /// nudges confidence up on success or down on failure.
    fn reinforce(&self, id: Uuid, success: bool) -> InstinctResult<InstinctRecord>;

    /// Delete an instinct. Returns false if the id was absent, so callers
    /// can delete idempotently.
    fn delete(&self, id: Uuid) -> InstinctResult<bool>;

    /// Lexical match against trigger and action of enabled instincts.
    ///
    /// Scoring: case-insensitive token overlap count, with a bonus that
    /// guarantees exact substring matches are never dropped. Ties break by
    /// most-recently-updated, then id, so identical inputs always rank
    /// identically.
    fn match_instincts(&self, query: &str) -> InstinctResult<Vec<InstinctRecord>>;

    /// Number of instincts in this store.
    fn count(&self) -> InstinctResult<usize>;

    /// Persist decayed confidences, holding the write lock for the whole
    /// pass. Returns the number of records whose confidence changed.
    fn commit_decay(&self) -> InstinctResult<usize>;

    /// Insert records preserving id, timestamps, and every field exactly.
    /// Used by migration; runs in a single transaction.
    fn import_batch(&self, records: &[InstinctRecord]) -> InstinctResult<usize>;
}

/// SQLite-backed instinct store for one thread.
#[derive(Debug)]
pub struct SqliteInstinctStore {
    thread_id: String,
    conn: Mutex<Connection>,
    decay: DecayConfig,
}

impl SqliteInstinctStore {
    /// Open or create a store at the given path.
    pub fn new(
        path: impl AsRef<Path>,
        thread_id: impl Into<String>,
        decay: DecayConfig,
    ) -> InstinctResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, thread_id, decay)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory(thread_id: impl Into<String>) -> InstinctResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, thread_id, DecayConfig::default())
    }

    fn with_connection(
        conn: Connection,
        thread_id: impl Into<String>,
        decay: DecayConfig,
    ) -> InstinctResult<Self> {
        let store = Self {
            thread_id: thread_id.into(),
            conn: Mutex::new(conn),
            decay,
        };
        store.init_schema()?;
        debug!(thread_id = %store.thread_id, "Opened instinct store");
        Ok(store)
    }

    fn init_schema(&self) -> InstinctResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS instincts (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                "trigger" TEXT NOT NULL,
                "action" TEXT NOT NULL,
                domain TEXT NOT NULL,
                source TEXT NOT NULL,
                confidence REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'enabled',
                occurrence_count INTEGER NOT NULL DEFAULT 0,
                success_rate REAL NOT NULL DEFAULT 1.0,
                last_triggered TEXT,
                last_decayed TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_instincts_domain ON instincts(thread_id, domain);
            CREATE INDEX IF NOT EXISTS idx_instincts_status ON instincts(thread_id, status);
            CREATE INDEX IF NOT EXISTS idx_instincts_confidence ON instincts(thread_id, confidence);
        "#,
        )?;
        Ok(())
    }

    fn parse_ts(value: &str) -> InstinctResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| InstinctError::parse(format!("bad timestamp '{}': {}", value, e)))
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> InstinctResult<InstinctRecord> {
        let id: String = row.get(0)?;
        let thread_id: String = row.get(1)?;
        let trigger: String = row.get(2)?;
        let action: String = row.get(3)?;
        let domain: String = row.get(4)?;
        let source: String = row.get(5)?;
        let confidence: f64 = row.get(6)?;
        let status: String = row.get(7)?;
        let occurrence_count: u32 = row.get(8)?;
        let success_rate: f64 = row.get(9)?;
        let last_triggered: Option<String> = row.get(10)?;
        let last_decayed: Option<String> = row.get(11)?;
        let created_at: String = row.get(12)?;
        let updated_at: String = row.get(13)?;

        Ok(InstinctRecord {
            id: Uuid::parse_str(&id)
                .map_err(|e| InstinctError::parse(format!("bad id '{}': {}", id, e)))?,
            thread_id,
            trigger,
            action,
            domain,
            source: crate::types::InstinctSource::parse(&source)
                .ok_or_else(|| InstinctError::parse(format!("bad source '{}'", source)))?,
            confidence,
            status: InstinctStatus::parse(&status)
                .ok_or_else(|| InstinctError::unknown_status(&status))?,
            occurrence_count,
            success_rate,
            last_triggered: last_triggered.as_deref().map(Self::parse_ts).transpose()?,
            last_decayed: last_decayed.as_deref().map(Self::parse_ts).transpose()?,
            created_at: Self::parse_ts(&created_at)?,
            updated_at: Self::parse_ts(&updated_at)?,
        })
    }

    const SELECT_COLUMNS: &'static str = r#"id, thread_id, "trigger", "action", domain, source,
               confidence, status, occurrence_count, success_rate,
               last_triggered, last_decayed, created_at, updated_at"#;

    fn fetch(conn: &Connection, id: Uuid) -> InstinctResult<Option<InstinctRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM instincts WHERE id = ?1",
            Self::SELECT_COLUMNS
        ))?;
        stmt.query_row(params![id.to_string()], |row| Ok(Self::row_to_record(row)))
            .optional()?
            .transpose()
    }

    /// Next `updated_at` value: wall clock, nudged forward if the clock has
    /// not advanced past the previous mutation.
    fn next_updated_at(prev: DateTime<Utc>) -> DateTime<Utc> {
        let now = Utc::now();
        if now > prev {
            now
        } else {
            prev + chrono::Duration::microseconds(1)
        }
    }

    fn insert_record(conn: &Connection, record: &InstinctRecord) -> InstinctResult<()> {
        conn.execute(
            r#"INSERT INTO instincts
               (id, thread_id, "trigger", "action", domain, source, confidence, status,
                occurrence_count, success_rate, last_triggered, last_decayed, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"#,
            params![
                record.id.to_string(),
                record.thread_id,
                record.trigger,
                record.action,
                record.domain,
                record.source.as_str(),
                record.confidence,
                record.status.as_str(),
                record.occurrence_count,
                record.success_rate,
                record.last_triggered.map(|dt| dt.to_rfc3339()),
                record.last_decayed.map(|dt| dt.to_rfc3339()),
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl InstinctStore for SqliteInstinctStore {
    fn thread_id(&self) -> &str {
        &self.thread_id
    }

    fn create(&self, draft: InstinctDraft) -> InstinctResult<InstinctRecord> {
        let draft = draft.validated()?;
        let now = Utc::now();
        let record = InstinctRecord {
            id: Uuid::new_v4(),
            thread_id: self.thread_id.clone(),
            trigger: draft.trigger,
            action: draft.action,
            domain: draft.domain,
            source: draft.source,
            confidence: draft.confidence,
            status: InstinctStatus::Enabled,
            occurrence_count: 0,
            success_rate: 1.0,
            last_triggered: None,
            last_decayed: None,
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn.lock().unwrap();
        Self::insert_record(&conn, &record)?;
        Ok(record)
    }

    fn get(&self, id: Uuid) -> InstinctResult<InstinctRecord> {
        let conn = self.conn.lock().unwrap();
        Self::fetch(&conn, id)?.ok_or_else(|| InstinctError::not_found(id))
    }

    fn list(&self, filter: &InstinctFilter, apply_decay: bool) -> InstinctResult<Vec<InstinctRecord>> {
        let rows = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(&format!(
                r#"SELECT {} FROM instincts
                   WHERE thread_id = :thread
                     AND (:domain IS NULL OR domain = :domain)
                     AND (:status IS NULL OR status = :status)"#,
                Self::SELECT_COLUMNS
            ))?;

            let results = stmt.query_map(
                named_params! {
                    ":thread": self.thread_id,
                    ":domain": filter.domain.as_deref(),
                    ":status": filter.status.map(|s| s.as_str()),
                },
                |row| Ok(Self::row_to_record(row)),
            )?;

            results
                .map(|r| r.map_err(InstinctError::from).and_then(|inner| inner))
                .collect::<InstinctResult<Vec<_>>>()?
        };

        let now = Utc::now();
        let mut records: Vec<InstinctRecord> = rows
            .into_iter()
            .map(|mut record| {
                if apply_decay {
                    record.confidence = decayed_at(&record, now, &self.decay);
                }
                record
            })
            .filter(|record| {
                filter
                    .min_confidence
                    .map_or(true, |min| record.confidence >= min)
            })
            .collect();

        records.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(records)
    }

    fn adjust_confidence(&self, id: Uuid, delta: f64) -> InstinctResult<InstinctRecord> {
        let conn = self.conn.lock().unwrap();
        let mut record = Self::fetch(&conn, id)?.ok_or_else(|| InstinctError::not_found(id))?;

        record.confidence = clamp_unit(record.confidence + delta);
        record.updated_at = Self::next_updated_at(record.updated_at);

        conn.execute(
            "UPDATE instincts SET confidence = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                id.to_string(),
                record.confidence,
                record.updated_at.to_rfc3339()
            ],
        )?;
        Ok(record)
    }

    fn set_status(&self, id: Uuid, status: &str) -> InstinctResult<InstinctRecord> {
        let parsed =
            InstinctStatus::parse(status).ok_or_else(|| InstinctError::unknown_status(status))?;

        let conn = self.conn.lock().unwrap();
        let mut record = Self::fetch(&conn, id)?.ok_or_else(|| InstinctError::not_found(id))?;

        record.status = parsed;
        record.updated_at = Self::next_updated_at(record.updated_at);

        conn.execute(
            "UPDATE instincts SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                id.to_string(),
                record.status.as_str(),
                record.updated_at.to_rfc3339()
            ],
        )?;
        Ok(record)
    }

    fn reinforce(&self, id: Uuid, success: bool) -> InstinctResult<InstinctRecord> {
        let conn = self.conn.lock().unwrap();
        let mut record = Self::fetch(&conn, id)?.ok_or_else(|| InstinctError::not_found(id))?;

        let before = f64::from(record.occurrence_count);
        record.occurrence_count += 1;
        let after = f64::from(record.occurrence_count);
        let outcome = if success { 1.0 } else { 0.0 };
        record.success_rate = clamp_unit((record.success_rate * before + outcome) / after);

        let step = if success { REINFORCE_STEP } else { -REINFORCE_STEP };
        record.confidence = clamp_unit(record.confidence + step);

        record.updated_at = Self::next_updated_at(record.updated_at);
        record.last_triggered = Some(record.updated_at);

        // One statement, so the three field updates land atomically.
        conn.execute(
            r#"UPDATE instincts
               SET occurrence_count = ?2, success_rate = ?3, confidence = ?4,
                   last_triggered = ?5, updated_at = ?5
               WHERE id = ?1"#,
            params![
                id.to_string(),
                record.occurrence_count,
                record.success_rate,
                record.confidence,
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(record)
    }

    fn delete(&self, id: Uuid) -> InstinctResult<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM instincts WHERE id = ?1", params![id.to_string()])?;
        Ok(removed > 0)
    }

    fn match_instincts(&self, query: &str) -> InstinctResult<Vec<InstinctRecord>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let query_tokens = tokenize(&needle);

        let candidates =
            self.list(&InstinctFilter::new().status(InstinctStatus::Enabled), false)?;

        let mut scored: Vec<(usize, InstinctRecord)> = candidates
            .into_iter()
            .filter_map(|record| {
                let haystack =
                    format!("{} {}", record.trigger, record.action).to_lowercase();
                let overlap = tokenize(&haystack)
                    .intersection(&query_tokens)
                    .count();
                // Substring bonus outranks any pure token overlap and keeps
                // exact matches from ever being dropped.
                let score = if haystack.contains(&needle) {
                    overlap + query_tokens.len() + 1
                } else {
                    overlap
                };
                (score > 0).then_some((score, record))
            })
            .collect();

        scored.sort_by(|(score_a, a), (score_b, b)| {
            score_b
                .cmp(score_a)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(scored.into_iter().map(|(_, record)| record).collect())
    }

    fn count(&self) -> InstinctResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM instincts WHERE thread_id = ?1",
            params![self.thread_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn commit_decay(&self) -> InstinctResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let records = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM instincts WHERE thread_id = ?1",
                Self::SELECT_COLUMNS
            ))?;
            let results =
                stmt.query_map(params![self.thread_id], |row| Ok(Self::row_to_record(row)))?;
            results
                .map(|r| r.map_err(InstinctError::from).and_then(|inner| inner))
                .collect::<InstinctResult<Vec<_>>>()?
        };

        let tx = conn.transaction()?;
        let mut changed = 0;
        for record in records {
            let decayed = decayed_at(&record, now, &self.decay);
            // Skip rows where only clock jitter separates the values.
            if record.confidence - decayed > 1e-9 {
                let updated_at = Self::next_updated_at(record.updated_at);
                tx.execute(
                    r#"UPDATE instincts
                       SET confidence = ?2, last_decayed = ?3, updated_at = ?4
                       WHERE id = ?1"#,
                    params![
                        record.id.to_string(),
                        decayed,
                        now.to_rfc3339(),
                        updated_at.to_rfc3339()
                    ],
                )?;
                changed += 1;
            }
        }
        tx.commit()?;

        debug!(thread_id = %self.thread_id, changed, "Committed decayed confidences");
        Ok(changed)
    }

    fn import_batch(&self, records: &[InstinctRecord]) -> InstinctResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for record in records {
            let mut record = record.clone();
            record.confidence = clamp_unit(record.confidence);
            record.success_rate = clamp_unit(record.success_rate);
            Self::insert_record(&tx, &record)?;
        }
        tx.commit()?;
        Ok(records.len())
    }
}
