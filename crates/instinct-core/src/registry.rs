//! Store-handle factory.
//!
//! Every conversation thread owns one SQLite database under a base
//! directory. The registry is an explicit value owned by the caller's
//! session context: open one where the stores are needed instead of reaching
//! for process-global state, and drop it when the session ends.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::decay::DecayConfig;
use crate::error::{InstinctError, InstinctResult};
use crate::store::SqliteInstinctStore;

/// Configuration for a [`StoreRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory holding one `<thread>.db` per thread.
    pub base_dir: PathBuf,
    /// Directory holding legacy journal files, if migration is needed.
    pub legacy_dir: Option<PathBuf>,
    /// Decay parameters applied by every store the registry opens.
    pub decay: DecayConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let base_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("instinct");
        Self {
            base_dir,
            legacy_dir: None,
            decay: DecayConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Set the base directory for thread databases.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Set the directory holding legacy journal files.
    pub fn with_legacy_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.legacy_dir = Some(dir.into());
        self
    }

    /// Set the decay parameters.
    pub fn with_decay(mut self, decay: DecayConfig) -> Self {
        self.decay = decay;
        self
    }

    /// Create config from environment variables.
    ///
    /// Reads:
    /// - `INSTINCT_DATA_DIR` (default: platform data dir + "instinct")
    /// - `INSTINCT_LEGACY_DIR` (default: none)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("INSTINCT_DATA_DIR") {
            config.base_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("INSTINCT_LEGACY_DIR") {
            config.legacy_dir = Some(PathBuf::from(dir));
        }

        config
    }
}

/// Factory handing out per-thread store handles.
///
/// Handles are cached, so repeated lookups for one thread share a single
/// connection and its write serialization.
pub struct StoreRegistry {
    config: RegistryConfig,
    handles: Mutex<HashMap<String, Arc<SqliteInstinctStore>>>,
}

impl StoreRegistry {
    /// Create a registry, creating the base directory if absent.
    pub fn new(config: RegistryConfig) -> InstinctResult<Self> {
        fs::create_dir_all(&config.base_dir)?;
        debug!(base_dir = %config.base_dir.display(), "Opened store registry");
        Ok(Self {
            config,
            handles: Mutex::new(HashMap::new()),
        })
    }

    /// Registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Directory holding legacy journal files.
    ///
    /// Errors when the registry was configured without one; migration
    /// callers need it.
    pub fn legacy_dir(&self) -> InstinctResult<&Path> {
        self.config
            .legacy_dir
            .as_deref()
            .ok_or_else(|| InstinctError::Configuration("legacy_dir is not configured".to_string()))
    }

    /// Database path for a thread.
    pub fn db_path(&self, thread_id: &str) -> PathBuf {
        self.config
            .base_dir
            .join(format!("{}.db", sanitize_thread_id(thread_id)))
    }

    /// Open the store for a thread, creating an empty one if absent.
    pub fn open_or_create(&self, thread_id: &str) -> InstinctResult<Arc<SqliteInstinctStore>> {
        if thread_id.trim().is_empty() {
            return Err(InstinctError::validation("thread_id must be non-empty"));
        }

        let mut handles = self.handles.lock().unwrap();
        if let Some(store) = handles.get(thread_id) {
            return Ok(store.clone());
        }

        let store = Arc::new(SqliteInstinctStore::new(
            self.db_path(thread_id),
            thread_id,
            self.config.decay,
        )?);
        handles.insert(thread_id.to_string(), store.clone());
        Ok(store)
    }

    /// Thread identifiers that already have a database on disk.
    pub fn known_threads(&self) -> InstinctResult<Vec<String>> {
        let mut threads = Vec::new();
        for entry in fs::read_dir(&self.config.base_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("db") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    threads.push(stem.to_string());
                }
            }
        }
        threads.sort();
        Ok(threads)
    }
}

/// Map a thread identifier to a safe file name component.
fn sanitize_thread_id(thread_id: &str) -> String {
    thread_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
