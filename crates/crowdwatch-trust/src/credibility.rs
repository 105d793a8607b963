//! Report credibility scoring and removal policy.
//!
//! A report's score combines its author's reputation with squashed vote
//! counts:
//!
//! ```text
//! x = reputation(author)
//! y = sigmoid(k * upvotes)
//! z = sigmoid(k * downvotes)
//! score = clamp((w1*x + w2*y + w3*z) / (w1 + |w2| + |w3|), 0, 1)
//! ```
//!
//! rounded to three decimals. A report confirmed by an authoritative source
//! short-circuits to 1.0.
//!
//! Removal is two independent age/score rules joined by OR; verified
//! reports are never removed.

use std::fmt;
use std::sync::Arc;

use crowdwatch_core::constants::{
    AGREE_VOTE_WEIGHT_W2, CREDIBILITY_THRESHOLD_HIGH, CREDIBILITY_THRESHOLD_LOW_REMOVE,
    CREDIBILITY_THRESHOLD_MEDIUM, CREDIBILITY_THRESHOLD_MEDIUM_REMOVE, DAYS_THRESHOLD_LOW_REMOVE,
    DAYS_THRESHOLD_MEDIUM_REMOVE, DISAGREE_VOTE_WEIGHT_W3, MIN_VOTES_THRESHOLD,
    REPUTATION_WEIGHT_W1, SIGMOID_K,
};
use crowdwatch_core::error::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::reputation::ReputationManager;
use crate::sigmoid::normalize_votes;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for [`CredibilityCalculator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredibilityConfig {
    pub reputation_weight: f64,
    pub upvote_weight: f64,
    /// Normally negative.
    pub downvote_weight: f64,
    pub sigmoid_k: f64,
    /// Votes needed before a score counts as community-evaluated.
    pub min_votes: u32,
    pub high_threshold: f64,
    pub medium_threshold: f64,
    pub low_remove_threshold: f64,
    pub low_remove_days: u32,
    pub medium_remove_threshold: f64,
    pub medium_remove_days: u32,
}

impl Default for CredibilityConfig {
    fn default() -> Self {
        Self {
            reputation_weight: REPUTATION_WEIGHT_W1,
            upvote_weight: AGREE_VOTE_WEIGHT_W2,
            downvote_weight: DISAGREE_VOTE_WEIGHT_W3,
            sigmoid_k: SIGMOID_K,
            min_votes: MIN_VOTES_THRESHOLD,
            high_threshold: CREDIBILITY_THRESHOLD_HIGH,
            medium_threshold: CREDIBILITY_THRESHOLD_MEDIUM,
            low_remove_threshold: CREDIBILITY_THRESHOLD_LOW_REMOVE,
            low_remove_days: DAYS_THRESHOLD_LOW_REMOVE,
            medium_remove_threshold: CREDIBILITY_THRESHOLD_MEDIUM_REMOVE,
            medium_remove_days: DAYS_THRESHOLD_MEDIUM_REMOVE,
        }
    }
}

impl CredibilityConfig {
    /// Normalizer for the weighted sum.
    pub fn weight_sum(&self) -> f64 {
        self.reputation_weight + self.upvote_weight.abs() + self.downvote_weight.abs()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.weight_sum() > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "credibility.weights",
                message: format!("weight sum {} must be positive", self.weight_sum()),
            });
        }
        if !(self.sigmoid_k >= 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "credibility.sigmoid_k",
                message: format!("{} must be non-negative", self.sigmoid_k),
            });
        }
        if self.medium_threshold > self.high_threshold {
            return Err(ConfigError::InvalidValue {
                field: "credibility.medium_threshold",
                message: "must not exceed high_threshold".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredibilityLevel {
    High,
    Medium,
    Low,
}

impl fmt::Display for CredibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => f.write_str("High"),
            Self::Medium => f.write_str("Medium"),
            Self::Low => f.write_str("Low"),
        }
    }
}

/// How far along validation a report is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationStatus {
    VerifiedByAuthority,
    NeedsVotes { remaining: u32 },
    CommunityEvaluated,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VerifiedByAuthority => f.write_str("verified by authoritative source"),
            Self::NeedsVotes { remaining } => {
                write!(f, "not yet validated, needs {remaining} more votes")
            }
            Self::CommunityEvaluated => f.write_str("community-evaluated"),
        }
    }
}

/// Intermediate terms of the weighted sum, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredibilityBreakdown {
    pub x_reputation: f64,
    pub y_upvotes: f64,
    pub z_downvotes: f64,
    pub weight_sum: f64,
    pub formula: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredibilityResult {
    /// In `[0, 1]`, rounded to three decimals.
    pub score: f64,
    pub level: CredibilityLevel,
    pub status: ValidationStatus,
    pub user_reputation: f64,
    pub upvotes: u32,
    pub downvotes: u32,
    pub total_votes: u32,
    /// Absent on the verified short-circuit.
    pub breakdown: Option<CredibilityBreakdown>,
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Scores reports from reputation and votes.
pub struct CredibilityCalculator {
    reputation: Arc<ReputationManager>,
    config: CredibilityConfig,
}

impl CredibilityCalculator {
    pub fn new(reputation: Arc<ReputationManager>, config: CredibilityConfig) -> Self {
        Self { reputation, config }
    }

    pub fn config(&self) -> &CredibilityConfig {
        &self.config
    }

    pub fn calculate_credibility(
        &self,
        user: &str,
        upvotes: u32,
        downvotes: u32,
        verified: bool,
    ) -> CredibilityResult {
        let x = self.reputation.get_reputation(user);
        let total_votes = upvotes.saturating_add(downvotes);

        if verified {
            return CredibilityResult {
                score: 1.0,
                level: CredibilityLevel::High,
                status: ValidationStatus::VerifiedByAuthority,
                user_reputation: round3(x),
                upvotes,
                downvotes,
                total_votes,
                breakdown: None,
            };
        }

        let c = &self.config;
        let y = normalize_votes(upvotes, c.sigmoid_k);
        let z = normalize_votes(downvotes, c.sigmoid_k);
        let weight_sum = c.weight_sum();
        let raw = c.reputation_weight * x + c.upvote_weight * y + c.downvote_weight * z;
        let normalized = if weight_sum > 0.0 { raw / weight_sum } else { raw };
        let clamped = if normalized.is_nan() { 0.0 } else { normalized.clamp(0.0, 1.0) };
        let score = round3(clamped);

        let status = if total_votes < c.min_votes {
            ValidationStatus::NeedsVotes {
                remaining: c.min_votes - total_votes,
            }
        } else {
            ValidationStatus::CommunityEvaluated
        };

        let (xr, yr, zr) = (round3(x), round3(y), round3(z));
        CredibilityResult {
            score,
            level: self.level_for(score),
            status,
            user_reputation: xr,
            upvotes,
            downvotes,
            total_votes,
            breakdown: Some(CredibilityBreakdown {
                x_reputation: xr,
                y_upvotes: yr,
                z_downvotes: zr,
                weight_sum: round3(weight_sum),
                formula: format!(
                    "({}*{} + {}*{} + {}*{}) / {}",
                    c.reputation_weight,
                    xr,
                    c.upvote_weight,
                    yr,
                    c.downvote_weight,
                    zr,
                    round3(weight_sum)
                ),
            }),
        }
    }

    pub fn level_for(&self, score: f64) -> CredibilityLevel {
        if score >= self.config.high_threshold {
            CredibilityLevel::High
        } else if score >= self.config.medium_threshold {
            CredibilityLevel::Medium
        } else {
            CredibilityLevel::Low
        }
    }

    /// Whether a report of this age and score should be taken down.
    pub fn should_remove_report(&self, score: f64, days_since_posted: u32, verified: bool) -> bool {
        if verified {
            return false;
        }
        let c = &self.config;
        if days_since_posted >= c.medium_remove_days && score < c.medium_remove_threshold {
            info!(
                score,
                days = days_since_posted,
                threshold = c.medium_remove_threshold,
                "credibility: removal by medium rule"
            );
            return true;
        }
        if days_since_posted >= c.low_remove_days && score < c.low_remove_threshold {
            info!(
                score,
                days = days_since_posted,
                threshold = c.low_remove_threshold,
                "credibility: removal by low rule"
            );
            return true;
        }
        false
    }
}
