//! Filter types for instinct listing.

use serde::{Deserialize, Serialize};

use crate::types::InstinctStatus;

/// Filter for [`crate::store::InstinctStore::list`].
///
/// The thread scope is implicit: every store handle is bound to one thread.
/// All fields are optional and combine with AND semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstinctFilter {
    /// Restrict to a single domain tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Restrict to a single status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<InstinctStatus>,
    /// Drop records whose (possibly decayed) confidence is below this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
}

impl InstinctFilter {
    /// Create an empty filter matching every record in the thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a domain tag.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Restrict to a status.
    pub fn status(mut self, status: InstinctStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Require a minimum confidence.
    pub fn min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(min);
        self
    }
}
