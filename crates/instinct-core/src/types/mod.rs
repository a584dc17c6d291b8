//! Core types shared across the crate.

mod filter;
mod instinct;

pub use filter::InstinctFilter;
pub use instinct::{InstinctDraft, InstinctRecord, InstinctSource, InstinctStatus};

pub(crate) use instinct::clamp_unit;
