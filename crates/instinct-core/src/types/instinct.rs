//! Instinct record types.
//!
//! An instinct is a small learned heuristic of the form trigger -> action,
//! scoped to a single conversation thread and carrying a confidence score
//! that erodes over time unless reinforced (see [`crate::decay`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{InstinctError, InstinctResult};

/// Lifecycle status of an instinct.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstinctStatus {
    /// Eligible for lookup and matching.
    Enabled,
    /// Retained but excluded from matching.
    Disabled,
}

impl InstinctStatus {
    /// Get the string representation stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }

    /// Parse from the stored string representation.
    ///
    /// Returns None for unrecognized values; callers turn that into
    /// [`InstinctError::UnknownStatus`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "enabled" => Some(Self::Enabled),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// How an instinct entered the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstinctSource {
    /// Learned automatically from conversation.
    Learned,
    /// Added explicitly by the user.
    Manual,
    /// Brought in from an external system.
    Imported,
}

impl InstinctSource {
    /// Get the string representation stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learned => "learned",
            Self::Manual => "manual",
            Self::Imported => "imported",
        }
    }

    /// Parse from the stored string representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "learned" => Some(Self::Learned),
            "manual" => Some(Self::Manual),
            "imported" => Some(Self::Imported),
            _ => None,
        }
    }
}

/// A per-thread learned heuristic: when `trigger` applies, do `action`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstinctRecord {
    /// Unique identifier, immutable once assigned.
    pub id: Uuid,
    /// Owning conversation thread, immutable.
    pub thread_id: String,
    /// Situation that activates this instinct.
    pub trigger: String,
    /// What to do when the trigger applies.
    pub action: String,
    /// Domain tag used for filtering (e.g. "scheduling").
    pub domain: String,
    /// How this instinct entered the store.
    pub source: InstinctSource,
    /// Confidence in [0.0, 1.0], clamped on every write.
    pub confidence: f64,
    /// Whether this instinct participates in matching.
    pub status: InstinctStatus,
    /// Times this instinct has been reinforced.
    pub occurrence_count: u32,
    /// Running average of reinforcement successes, in [0.0, 1.0].
    pub success_rate: f64,
    /// Last reinforcement time; resets the decay clock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_triggered: Option<DateTime<Utc>>,
    /// When decayed confidence was last persisted by an explicit
    /// decay-application call; re-anchors the decay clock so committed decay
    /// is not applied twice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_decayed: Option<DateTime<Utc>>,
    /// Creation time, immutable.
    pub created_at: DateTime<Utc>,
    /// Last mutation time; strictly increases with each mutation.
    pub updated_at: DateTime<Utc>,
}

impl InstinctRecord {
    /// Reference point for decay: the latest of creation, last
    /// reinforcement, and last persisted decay application.
    pub fn decay_reference(&self) -> DateTime<Utc> {
        let mut reference = self.created_at;
        for candidate in [self.last_triggered, self.last_decayed].into_iter().flatten() {
            if candidate > reference {
                reference = candidate;
            }
        }
        reference
    }
}

/// Validated creation input for an instinct.
///
/// The draft is a plain value holder: construction normalizes and validates,
/// and all mutation logic lives in the store so there is a single write path
/// per field.
#[derive(Debug, Clone)]
pub struct InstinctDraft {
    pub trigger: String,
    pub action: String,
    pub domain: String,
    pub source: InstinctSource,
    pub confidence: f64,
}

impl InstinctDraft {
    /// Create a draft; fields are validated by [`InstinctDraft::validated`].
    pub fn new(
        trigger: impl Into<String>,
        action: impl Into<String>,
        domain: impl Into<String>,
        source: InstinctSource,
        confidence: f64,
    ) -> Self {
        Self {
            trigger: trigger.into(),
            action: action.into(),
            domain: domain.into(),
            source,
            confidence,
        }
    }

    /// Trim text fields and validate invariants.
    ///
    /// Trigger, action, and domain must be non-empty after trimming;
    /// confidence must lie in [0.0, 1.0].
    pub fn validated(mut self) -> InstinctResult<Self> {
        self.trigger = self.trigger.trim().to_string();
        self.action = self.action.trim().to_string();
        self.domain = self.domain.trim().to_string();

        if self.trigger.is_empty() {
            return Err(InstinctError::missing_field("trigger"));
        }
        if self.action.is_empty() {
            return Err(InstinctError::missing_field("action"));
        }
        if self.domain.is_empty() {
            return Err(InstinctError::missing_field("domain"));
        }
        if !(0.0..=1.0).contains(&self.confidence) || self.confidence.is_nan() {
            return Err(InstinctError::out_of_range("confidence", self.confidence));
        }

        Ok(self)
    }
}

/// Clamp a confidence-like value into [0.0, 1.0].
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
