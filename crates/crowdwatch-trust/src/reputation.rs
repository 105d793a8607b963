//! Long-lived author reputation.
//!
//! Each user has a lazily created [`ReputationRecord`] holding a score in
//! `[0, 1]` and lifetime correct/incorrect tallies. Every feedback event
//! recomputes the user's lifetime accuracy from the tallies and blends it
//! into the stored score:
//!
//! ```text
//! accuracy = correct / total
//! new      = clamp(old * (1 - α) + accuracy * α, 0, 1)
//! ```
//!
//! The score therefore drifts toward lifetime accuracy at rate `α` per
//! event rather than tracking the latest outcome.
//!
//! Records live in a [`DashMap`]; updates hold the entry's shard lock for
//! the whole read-modify-write, so concurrent feedback for one user is
//! serialized and never loses an event.

use crowdwatch_core::constants::{DEFAULT_REPUTATION, REPUTATION_LEARNING_RATE};
use crowdwatch_core::error::ConfigError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Tunables for [`ReputationManager`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    /// Score assigned to users never seen before.
    pub default_reputation: f64,
    /// Blend factor `α` in `(0, 1]`.
    pub learning_rate: f64,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            default_reputation: DEFAULT_REPUTATION,
            learning_rate: REPUTATION_LEARNING_RATE,
        }
    }
}

impl ReputationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.default_reputation) {
            return Err(ConfigError::InvalidValue {
                field: "reputation.default_reputation",
                message: format!("{} is outside [0, 1]", self.default_reputation),
            });
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "reputation.learning_rate",
                message: format!("{} is outside (0, 1]", self.learning_rate),
            });
        }
        Ok(())
    }
}

/// Per-user reputation state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub reputation: f64,
    pub correct: u64,
    pub incorrect: u64,
    pub total: u64,
}

impl ReputationRecord {
    fn new(reputation: f64) -> Self {
        Self {
            reputation,
            correct: 0,
            incorrect: 0,
            total: 0,
        }
    }

    /// Lifetime share of correct outcomes; 0 with no history.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// Qualitative reputation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationLevel {
    Excellent,
    Good,
    Average,
    Low,
    VeryLow,
}

impl ReputationLevel {
    /// Bucket a score at the cut points 0.9 / 0.75 / 0.5 / 0.3.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::Excellent
        } else if score >= 0.75 {
            Self::Good
        } else if score >= 0.5 {
            Self::Average
        } else if score >= 0.3 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }
}

/// Summary returned by [`ReputationManager::get_user_stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStats {
    pub user: String,
    pub reputation: f64,
    pub total_reports: u64,
    pub correct_reports: u64,
    pub incorrect_reports: u64,
    pub accuracy: f64,
    pub level: ReputationLevel,
}

/// Owner of every [`ReputationRecord`].
pub struct ReputationManager {
    records: DashMap<String, ReputationRecord>,
    config: ReputationConfig,
}

impl ReputationManager {
    pub fn new(config: ReputationConfig) -> Self {
        Self {
            records: DashMap::new(),
            config,
        }
    }

    /// Current score for `user`, creating the record at the default if absent.
    pub fn get_reputation(&self, user: &str) -> f64 {
        self.record(user).reputation
    }

    /// Feed one verification outcome back into `user`'s reputation.
    ///
    /// Returns the new score.
    pub fn update_reputation(&self, user: &str, is_correct: bool) -> f64 {
        let alpha = self.config.learning_rate;
        let mut entry = self
            .records
            .entry(user.to_string())
            .or_insert_with(|| ReputationRecord::new(self.config.default_reputation));
        let record = entry.value_mut();

        let old = record.reputation;
        record.total = record.total.saturating_add(1);
        if is_correct {
            record.correct = record.correct.saturating_add(1);
        } else {
            record.incorrect = record.incorrect.saturating_add(1);
        }
        let blended = old * (1.0 - alpha) + record.accuracy() * alpha;
        record.reputation = blended.clamp(0.0, 1.0);

        info!(
            user,
            old,
            new = record.reputation,
            correct = record.correct,
            incorrect = record.incorrect,
            "reputation: updated"
        );
        record.reputation
    }

    pub fn get_user_stats(&self, user: &str) -> UserStats {
        let record = self.record(user);
        UserStats {
            user: user.to_string(),
            reputation: record.reputation,
            total_reports: record.total,
            correct_reports: record.correct,
            incorrect_reports: record.incorrect,
            accuracy: record.accuracy(),
            level: ReputationLevel::from_score(record.reputation),
        }
    }

    /// Number of users with a record.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record(&self, user: &str) -> ReputationRecord {
        *self
            .records
            .entry(user.to_string())
            .or_insert_with(|| ReputationRecord::new(self.config.default_reputation))
            .value()
    }
}

impl Default for ReputationManager {
    fn default() -> Self {
        Self::new(ReputationConfig::default())
    }
}
