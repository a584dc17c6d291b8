//! instinct-core - per-conversation instinct store.
//!
//! An instinct is a small learned heuristic of the form trigger -> action
//! with a confidence score that erodes along a half-life curve unless
//! reinforced by use. This crate provides the durable per-thread store, the
//! decay and reinforcement semantics, and an idempotent migration path from
//! the legacy append-only journal format.
//!
//! # Example
//!
//! ```no_run
//! use instinct_core::{
//!     InstinctDraft, InstinctFilter, InstinctSource, InstinctStore,
//!     RegistryConfig, StoreRegistry,
//! };
//!
//! fn main() -> instinct_core::InstinctResult<()> {
//!     let registry = StoreRegistry::new(RegistryConfig::from_env())?;
//!     let store = registry.open_or_create("thread-42")?;
//!
//!     let instinct = store.create(InstinctDraft::new(
//!         "user mentions deadline",
//!         "offer to create calendar reminder",
//!         "scheduling",
//!         InstinctSource::Learned,
//!         0.6,
//!     ))?;
//!
//!     store.reinforce(instinct.id, true)?;
//!     let ranked = store.list(&InstinctFilter::new().min_confidence(0.5), true)?;
//!     println!("{} instincts above threshold", ranked.len());
//!     Ok(())
//! }
//! ```

pub mod decay;
pub mod error;
pub mod migration;
pub mod registry;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use decay::{decayed_at, decayed_confidence, DecayConfig};
pub use error::{ErrorCode, InstinctError, InstinctResult};
pub use migration::{
    BulkMigrationReport, JsonlLegacyJournal, LegacyChanges, LegacyEvent, LegacyJournal,
    MigrationEngine, MigrationOutcome,
};
pub use registry::{RegistryConfig, StoreRegistry};
pub use store::{InstinctStore, SqliteInstinctStore};
pub use types::{InstinctDraft, InstinctFilter, InstinctRecord, InstinctSource, InstinctStatus};
