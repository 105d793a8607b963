//! Penalties for low-quality posting and fake alarms.
//!
//! Two ladders are evaluated independently and then merged:
//!
//! | Low-credibility posts | Penalty                       |
//! |-----------------------|-------------------------------|
//! | ≥ 10                  | permanent ban                 |
//! | ≥ 5                   | 30-day ban                    |
//! | ≥ 3                   | reward eligibility withdrawn  |
//!
//! Fake alarms index a duration table (`[90, 180, -1]` days by default),
//! with counts past the end of the table using the last entry.
//!
//! The fake-alarm penalty replaces the post-count penalty when there is no
//! post-count penalty, when it is permanent, or when its ban is strictly
//! longer. A permanent ban outranks any finite one.

use std::fmt;

use crowdwatch_core::constants::{
    BAN_LEVEL_1_THRESHOLD, BAN_LEVEL_2_DAYS, BAN_LEVEL_2_THRESHOLD, BAN_LEVEL_3_THRESHOLD,
    FAKE_ALARM_BAN_DAYS, LOW_CREDIBILITY_THRESHOLD_PENALTY,
};
use crowdwatch_core::error::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// BanDuration
// ---------------------------------------------------------------------------

/// Length of a ban. Ordered `None < Days(_) < Permanent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BanDuration {
    None,
    Days(u32),
    Permanent,
}

impl BanDuration {
    /// Decode the wire form: `0` no ban, `-1` (or any negative) permanent.
    pub fn from_days(days: i64) -> Self {
        match days {
            d if d < 0 => Self::Permanent,
            0 => Self::None,
            d => Self::Days(u32::try_from(d).unwrap_or(u32::MAX)),
        }
    }

    /// Wire form: `0` no ban, `-1` permanent, otherwise days.
    pub fn as_days(&self) -> i64 {
        match self {
            Self::None => 0,
            Self::Days(d) => i64::from(*d),
            Self::Permanent => -1,
        }
    }

    pub fn is_ban(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl Serialize for BanDuration {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_days())
    }
}

impl fmt::Display for BanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("no ban"),
            Self::Days(d) => write!(f, "{d}-day ban"),
            Self::Permanent => f.write_str("permanent ban"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for [`PenaltyEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyConfig {
    /// Score below which a post counts as low-credibility.
    pub low_credibility_threshold: f64,
    pub restrict_threshold: u32,
    pub temporary_ban_threshold: u32,
    pub permanent_ban_threshold: u32,
    pub temporary_ban_days: u32,
    /// Ban days per fake-alarm count; index 0 is the first offence, `-1` is permanent.
    pub fake_alarm_ban_days: Vec<i64>,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            low_credibility_threshold: LOW_CREDIBILITY_THRESHOLD_PENALTY,
            restrict_threshold: BAN_LEVEL_1_THRESHOLD,
            temporary_ban_threshold: BAN_LEVEL_2_THRESHOLD,
            permanent_ban_threshold: BAN_LEVEL_3_THRESHOLD,
            temporary_ban_days: BAN_LEVEL_2_DAYS,
            fake_alarm_ban_days: FAKE_ALARM_BAN_DAYS.to_vec(),
        }
    }
}

impl PenaltyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fake_alarm_ban_days.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "penalty.fake_alarm_ban_days",
                message: "must have at least one entry".into(),
            });
        }
        if self.fake_alarm_ban_days.iter().any(|d| *d < -1) {
            return Err(ConfigError::InvalidValue {
                field: "penalty.fake_alarm_ban_days",
                message: "entries must be -1 (permanent) or non-negative".into(),
            });
        }
        if !(self.restrict_threshold <= self.temporary_ban_threshold
            && self.temporary_ban_threshold <= self.permanent_ban_threshold)
        {
            return Err(ConfigError::InvalidValue {
                field: "penalty.thresholds",
                message: "restrict <= temporary_ban <= permanent_ban required".into(),
            });
        }
        Ok(())
    }

    /// Ban for the `count`-th confirmed fake alarm; `None` for zero.
    pub fn fake_alarm_ban(&self, count: u32) -> Option<BanDuration> {
        if count == 0 {
            return None;
        }
        let last = self.fake_alarm_ban_days.len().checked_sub(1)?;
        let index = (count as usize - 1).min(last);
        Some(BanDuration::from_days(self.fake_alarm_ban_days[index]))
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyLabel {
    Restricted,
    TemporaryBan,
    PermanentBan,
    FakeAlarmBan,
}

impl fmt::Display for PenaltyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restricted => f.write_str("restricted (level 1)"),
            Self::TemporaryBan => f.write_str("temporary ban (level 2)"),
            Self::PermanentBan => f.write_str("permanent ban"),
            Self::FakeAlarmBan => f.write_str("fake alarm ban"),
        }
    }
}

/// Outcome of [`PenaltyEngine::check_penalty`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PenaltyDecision {
    pub has_penalty: bool,
    pub label: Option<PenaltyLabel>,
    pub reason: Option<String>,
    #[serde(rename = "ban_duration_days")]
    pub ban: BanDuration,
    pub can_post: bool,
    pub can_interact: bool,
    pub reward_eligible: bool,
}

impl PenaltyDecision {
    pub fn none() -> Self {
        Self {
            has_penalty: false,
            label: None,
            reason: None,
            ban: BanDuration::None,
            can_post: true,
            can_interact: true,
            reward_eligible: true,
        }
    }

    /// `0` no ban, `-1` permanent, otherwise days.
    pub fn ban_duration_days(&self) -> i64 {
        self.ban.as_days()
    }
}

pub struct PenaltyEngine {
    config: PenaltyConfig,
}

impl PenaltyEngine {
    pub fn new(config: PenaltyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PenaltyConfig {
        &self.config
    }

    pub fn check_penalty(
        &self,
        user: &str,
        low_credibility_posts: u32,
        fake_alarms: u32,
    ) -> PenaltyDecision {
        let mut decision = self.post_count_penalty(low_credibility_posts);

        if let Some(ban) = self.config.fake_alarm_ban(fake_alarms) {
            let replaces = !decision.has_penalty
                || ban == BanDuration::Permanent
                || ban > decision.ban;
            if replaces {
                decision.has_penalty = true;
                decision.label = Some(PenaltyLabel::FakeAlarmBan);
                decision.reason = Some(format!("{fake_alarms} confirmed fake alarms ({ban})"));
                decision.ban = ban;
                decision.can_post = false;
                decision.can_interact = false;
            }
        }

        match (&decision.label, &decision.reason) {
            (Some(label), Some(reason)) => {
                warn!(user, %label, reason = reason.as_str(), ban_days = decision.ban.as_days(), "penalty: applied")
            }
            _ => info!(user, "penalty: none"),
        }
        decision
    }

    fn post_count_penalty(&self, count: u32) -> PenaltyDecision {
        let c = &self.config;
        let mut decision = PenaltyDecision::none();
        let (label, threshold) = if count >= c.permanent_ban_threshold {
            decision.ban = BanDuration::Permanent;
            decision.can_post = false;
            decision.can_interact = false;
            (PenaltyLabel::PermanentBan, c.permanent_ban_threshold)
        } else if count >= c.temporary_ban_threshold {
            decision.ban = BanDuration::from_days(i64::from(c.temporary_ban_days));
            decision.can_post = false;
            decision.can_interact = false;
            (PenaltyLabel::TemporaryBan, c.temporary_ban_threshold)
        } else if count >= c.restrict_threshold {
            decision.reward_eligible = false;
            (PenaltyLabel::Restricted, c.restrict_threshold)
        } else {
            return decision;
        };
        decision.has_penalty = true;
        decision.label = Some(label);
        decision.reason = Some(format!("{count} low-credibility posts (>= {threshold})"));
        decision
    }
}

impl Default for PenaltyEngine {
    fn default() -> Self {
        Self::new(PenaltyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn engine() -> PenaltyEngine {
        PenaltyEngine::default()
    }

    // -------------------------------------------------------------------------
    // Post-count ladder
    // -------------------------------------------------------------------------

    #[test]
    fn clean_user_has_no_penalty() {
        assert_eq!(engine().check_penalty("u", 2, 0), PenaltyDecision::none());
    }

    #[test]
    fn three_low_posts_only_withdraw_rewards() {
        let d = engine().check_penalty("u", 3, 0);
        assert!(d.has_penalty);
        assert_eq!(d.label, Some(PenaltyLabel::Restricted));
        assert_eq!(d.ban_duration_days(), 0);
        assert!(d.can_post && d.can_interact);
        assert!(!d.reward_eligible);
    }

    #[test]
    fn five_low_posts_is_thirty_day_ban() {
        let d = engine().check_penalty("u", 5, 0);
        assert_eq!(d.ban, BanDuration::Days(30));
        assert!(!d.can_post && !d.can_interact);
    }

    #[test]
    fn ten_low_posts_is_permanent() {
        let d = engine().check_penalty("u", 10, 0);
        assert_eq!(d.ban_duration_days(), -1);
        assert_eq!(d.label, Some(PenaltyLabel::PermanentBan));
        assert_eq!(d.reason.as_deref(), Some("10 low-credibility posts (>= 10)"));
    }

    // -------------------------------------------------------------------------
    // Fake alarms and merging
    // -------------------------------------------------------------------------

    #[test]
    fn fake_alarm_table_is_capped() {
        let c = PenaltyConfig::default();
        assert_eq!(c.fake_alarm_ban(0), None);
        assert_eq!(c.fake_alarm_ban(1), Some(BanDuration::Days(90)));
        assert_eq!(c.fake_alarm_ban(2), Some(BanDuration::Days(180)));
        assert_eq!(c.fake_alarm_ban(3), Some(BanDuration::Permanent));
        assert_eq!(c.fake_alarm_ban(40), Some(BanDuration::Permanent));
    }

    #[test]
    fn first_fake_alarm_overrides_shorter_ban() {
        let d = engine().check_penalty("u", 5, 1);
        assert_eq!(d.label, Some(PenaltyLabel::FakeAlarmBan));
        assert_eq!(d.ban, BanDuration::Days(90));
    }

    #[test]
    fn fake_alarm_on_restricted_user_keeps_reward_flag() {
        let d = engine().check_penalty("u", 3, 1);
        assert_eq!(d.ban, BanDuration::Days(90));
        assert!(!d.can_post);
        assert!(!d.reward_eligible);
    }

    #[test]
    fn finite_fake_alarm_ban_never_shortens_permanent() {
        let d = engine().check_penalty("u", 10, 1);
        assert_eq!(d.ban, BanDuration::Permanent);
        assert_eq!(d.label, Some(PenaltyLabel::PermanentBan));
    }

    #[test]
    fn ban_ordering() {
        assert!(BanDuration::Permanent > BanDuration::Days(u32::MAX));
        assert!(BanDuration::Days(1) > BanDuration::None);
        assert_eq!(BanDuration::from_days(-1), BanDuration::Permanent);
        assert_eq!(BanDuration::from_days(0), BanDuration::None);
    }

    #[test]
    fn empty_fake_alarm_table_is_rejected() {
        let config = PenaltyConfig { fake_alarm_ban_days: vec![], ..PenaltyConfig::default() };
        assert!(config.validate().is_err());
    }

    proptest! {
        #[test]
        fn three_fake_alarms_always_permanent(posts in 0u32..100, alarms in 3u32..50) {
            let d = engine().check_penalty("u", posts, alarms);
            prop_assert_eq!(d.ban, BanDuration::Permanent);
            prop_assert!(!d.can_post && !d.can_interact);
        }

        #[test]
        fn zero_fake_alarms_never_alter_post_penalty(posts in 0u32..100) {
            let e = engine();
            prop_assert_eq!(e.check_penalty("u", posts, 0), e.post_count_penalty(posts));
        }

        #[test]
        fn one_fake_alarm_overrides_sub_ninety_day_penalty(posts in 0u32..10) {
            let d = engine().check_penalty("u", posts, 1);
            prop_assert_eq!(d.ban, BanDuration::Days(90));
            prop_assert_eq!(d.label, Some(PenaltyLabel::FakeAlarmBan));
        }
    }
}
