//! Aggregate configuration for every trust component.

use crowdwatch_core::error::ConfigError;
use serde::{Deserialize, Serialize};

use crate::credibility::CredibilityConfig;
use crate::duplicate::DuplicateConfig;
use crate::filter::FilterConfig;
use crate::penalty::PenaltyConfig;
use crate::rate_limiter::RateLimitConfig;
use crate::reputation::ReputationConfig;
use crate::reward::RewardConfig;

/// Every tunable of the trust pipeline. Missing sections take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    pub rate_limit: RateLimitConfig,
    pub filter: FilterConfig,
    pub reputation: ReputationConfig,
    pub credibility: CredibilityConfig,
    pub reward: RewardConfig,
    pub penalty: PenaltyConfig,
    pub duplicate: DuplicateConfig,
}

impl TrustConfig {
    /// Check every section. Pattern compilation happens later, when the
    /// content filter is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rate_limit.validate()?;
        self.filter.validate()?;
        self.reputation.validate()?;
        self.credibility.validate()?;
        self.reward.validate()?;
        self.penalty.validate()?;
        self.duplicate.validate()?;
        Ok(())
    }
}
