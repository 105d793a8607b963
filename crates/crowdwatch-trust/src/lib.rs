//! # crowdwatch-trust
//! Trust components for crowd-submitted incident reports.
//!
//! Each component is a self-contained service constructed from its own
//! config section of [`config::TrustConfig`]:
//!
//! - [`rate_limiter::RateLimiter`] throttles submissions per user
//! - [`filter::ContentFilter`] decides admissibility of report text
//! - [`reputation::ReputationManager`] owns per-author reputation
//! - [`credibility::CredibilityCalculator`] scores reports and decides removal
//! - [`reward::RewardEngine`] and [`penalty::PenaltyEngine`] judge authors
//! - [`duplicate::DuplicateDetector`] finds near-duplicate nearby reports

pub mod config;
pub mod credibility;
pub mod duplicate;
pub mod filter;
pub mod penalty;
pub mod rate_limiter;
pub mod reputation;
pub mod reward;
pub mod sigmoid;
