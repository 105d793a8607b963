//! Reward eligibility for consistently credible authors.
//!
//! All-or-nothing: an author needs at least `min_posts` high-credibility
//! posts and then at least `min_total_upvotes` upvotes across their reports.
//! The payout is `posts * reward_per_post`.

use crowdwatch_core::constants::{
    HIGH_CREDIBILITY_THRESHOLD, MIN_POSTS_FOR_REWARD, MIN_TOTAL_UPVOTES,
    REWARD_PER_HIGH_CREDIBILITY_POST,
};
use crowdwatch_core::error::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Tunables for [`RewardEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Score at or above which a post counts as high-credibility.
    pub high_credibility_threshold: f64,
    pub min_posts: u32,
    pub min_total_upvotes: u64,
    pub reward_per_post: u64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            high_credibility_threshold: HIGH_CREDIBILITY_THRESHOLD,
            min_posts: MIN_POSTS_FOR_REWARD,
            min_total_upvotes: MIN_TOTAL_UPVOTES,
            reward_per_post: REWARD_PER_HIGH_CREDIBILITY_POST,
        }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.high_credibility_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "reward.high_credibility_threshold",
                message: format!("{} is outside [0, 1]", self.high_credibility_threshold),
            });
        }
        Ok(())
    }
}

/// Outcome of [`RewardEngine::calculate_reward`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RewardDecision {
    Eligible {
        amount: u64,
        high_credibility_posts: u32,
        total_upvotes: u64,
    },
    NotEnoughPosts { have: u32, need: u32 },
    NotEnoughUpvotes { have: u64, need: u64 },
    /// An active penalty has disabled rewards for this author.
    Withheld { reason: String },
}

impl RewardDecision {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible { .. })
    }

    /// Payout; zero when ineligible.
    pub fn amount(&self) -> u64 {
        match self {
            Self::Eligible { amount, .. } => *amount,
            _ => 0,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            Self::Eligible { .. } => "eligible for reward".to_string(),
            Self::NotEnoughPosts { need, .. } => {
                format!("needs at least {need} high-credibility posts")
            }
            Self::NotEnoughUpvotes { need, .. } => format!("needs at least {need} upvotes"),
            Self::Withheld { reason } => format!("rewards withheld: {reason}"),
        }
    }
}

pub struct RewardEngine {
    config: RewardConfig,
}

impl RewardEngine {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    pub fn calculate_reward(
        &self,
        user: &str,
        high_credibility_posts: u32,
        total_upvotes: u64,
    ) -> RewardDecision {
        let c = &self.config;
        if high_credibility_posts < c.min_posts {
            info!(user, have = high_credibility_posts, need = c.min_posts, "reward: not enough posts");
            return RewardDecision::NotEnoughPosts {
                have: high_credibility_posts,
                need: c.min_posts,
            };
        }
        if total_upvotes < c.min_total_upvotes {
            info!(user, have = total_upvotes, need = c.min_total_upvotes, "reward: not enough upvotes");
            return RewardDecision::NotEnoughUpvotes {
                have: total_upvotes,
                need: c.min_total_upvotes,
            };
        }
        let amount = u64::from(high_credibility_posts).saturating_mul(c.reward_per_post);
        info!(user, amount, "reward: eligible");
        RewardDecision::Eligible {
            amount,
            high_credibility_posts,
            total_upvotes,
        }
    }
}

impl Default for RewardEngine {
    fn default() -> Self {
        Self::new(RewardConfig::default())
    }
}
