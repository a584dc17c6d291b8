//! Temporal confidence decay.
//!
//! Confidence erodes along an exponential half-life curve and never drops
//! below a configurable floor. Decay is a pure recomputation against the
//! evaluation time: nothing here mutates stored state, so it is safe to call
//! from any number of concurrent readers. Persisting decayed values is a
//! separate explicit store operation
//! ([`crate::store::InstinctStore::commit_decay`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::InstinctRecord;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Parameters of the decay curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Days for confidence to halve without reinforcement. Default: 30.
    pub half_life_days: f64,
    /// Lower bound decay never crosses. Default: 0.3.
    pub floor: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            half_life_days: 30.0,
            floor: 0.3,
        }
    }
}

impl DecayConfig {
    /// Create a decay config with a custom half-life in days.
    ///
    /// The half-life is kept strictly positive.
    pub fn with_half_life(mut self, days: f64) -> Self {
        self.half_life_days = days.max(f64::MIN_POSITIVE);
        self
    }

    /// Create a decay config with a custom floor.
    pub fn with_floor(mut self, floor: f64) -> Self {
        self.floor = floor.clamp(0.0, 1.0);
        self
    }
}

/// Decayed confidence after `age_days` without reinforcement.
///
/// Pure and deterministic; negative ages clamp to zero, so the function never
/// raises a record's confidence above its base value.
pub fn decayed_confidence(base: f64, age_days: f64, config: &DecayConfig) -> f64 {
    let age = if age_days.is_nan() { 0.0 } else { age_days.max(0.0) };
    let decayed = base * 0.5_f64.powf(age / config.half_life_days);
    decayed.max(config.floor)
}

/// Decayed confidence of a record evaluated at `now`.
///
/// Age is measured from [`InstinctRecord::decay_reference`]: the later of
/// `created_at` and `last_triggered`, so reinforcement resets the decay
/// clock, and re-anchored by `last_decayed` once decay has been persisted.
pub fn decayed_at(record: &InstinctRecord, now: DateTime<Utc>, config: &DecayConfig) -> f64 {
    let age_days =
        (now - record.decay_reference()).num_milliseconds() as f64 / MILLIS_PER_DAY;
    decayed_confidence(record.confidence, age_days, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InstinctSource, InstinctStatus};
    use chrono::Duration;
    use uuid::Uuid;

    fn record(confidence: f64, created_days_ago: i64) -> InstinctRecord {
        let created = Utc::now() - Duration::days(created_days_ago);
        InstinctRecord {
            id: Uuid::new_v4(),
            thread_id: "t1".to_string(),
            trigger: "trigger".to_string(),
            action: "action".to_string(),
            domain: "general".to_string(),
            source: InstinctSource::Learned,
            confidence,
            status: InstinctStatus::Enabled,
            occurrence_count: 0,
            success_rate: 1.0,
            last_triggered: None,
            last_decayed: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_zero_age_is_identity() {
        let config = DecayConfig::default();
        assert_eq!(decayed_confidence(0.8, 0.0, &config), 0.8);
    }

    #[test]
    fn test_one_half_life_halves() {
        let config = DecayConfig::default();
        let decayed = decayed_confidence(0.8, 30.0, &config);
        assert!((decayed - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_floor_is_respected() {
        let config = DecayConfig::default();
        // Ten half-lives would leave ~0.0008 without the floor.
        assert_eq!(decayed_confidence(0.8, 300.0, &config), 0.3);
    }

    #[test]
    fn test_negative_age_clamps_to_zero() {
        let config = DecayConfig::default();
        assert_eq!(decayed_confidence(0.8, -5.0, &config), 0.8);
    }

    #[test]
    fn test_decayed_at_uses_last_triggered() {
        let config = DecayConfig::default();
        let mut r = record(0.8, 60);

        // Two half-lives old: well decayed (to the floor).
        assert_eq!(decayed_at(&r, Utc::now(), &config), 0.3);

        // Reinforced just now: zero-day age, no decay.
        r.last_triggered = Some(Utc::now());
        let fresh = decayed_at(&r, Utc::now(), &config);
        assert!((fresh - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic_for_fixed_now() {
        let config = DecayConfig::default();
        let r = record(0.7, 15);
        let now = Utc::now();
        assert_eq!(decayed_at(&r, now, &config), decayed_at(&r, now, &config));
    }

    #[test]
    fn test_custom_config() {
        let config = DecayConfig::default().with_half_life(10.0).with_floor(0.1);
        let decayed = decayed_confidence(0.8, 20.0, &config);
        assert!((decayed - 0.2).abs() < 1e-12);
    }
}
