//! Adversarial property-based test suite for Crowdwatch.
//!
//! These tests try to break the trust pipeline's invariants under
//! randomized inputs:
//! - credibility scores escaping [0, 1] for any reputation history
//! - removal of authority-verified reports
//! - penalty merging letting a lighter ban win
//! - reward thresholds paying out early
//! - vote bookkeeping double-counting under switches and repeats
//! - self-votes slipping through
//! - lost updates under concurrent voting

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;

use crowdwatch_core::error::ReportError;
use crowdwatch_core::types::{Coordinates, DuplicateCandidate, ReportId, VoteKind};
use crowdwatch_node_lib::coordinator::{LifecycleConfig, VoteOutcome};
use crowdwatch_tests::helpers::*;
use crowdwatch_trust::config::TrustConfig;
use crowdwatch_trust::credibility::{CredibilityCalculator, CredibilityConfig};
use crowdwatch_trust::duplicate::{DuplicateDetector, DuplicateVerdict};
use crowdwatch_trust::penalty::{BanDuration, PenaltyEngine, PenaltyLabel};
use crowdwatch_trust::rate_limiter::{RateLimitConfig, RateLimiter};
use crowdwatch_trust::reputation::{ReputationConfig, ReputationManager};
use crowdwatch_trust::reward::RewardEngine;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// A calculator whose author has been through `history`.
fn calculator_with_history(history: &[bool], config: CredibilityConfig) -> CredibilityCalculator {
    let reputation = Arc::new(ReputationManager::new(ReputationConfig::default()));
    for outcome in history {
        reputation.update_reputation("author", *outcome);
    }
    CredibilityCalculator::new(reputation, config)
}

fn vote_kind() -> impl Strategy<Value = VoteKind> {
    prop_oneof![Just(VoteKind::Up), Just(VoteKind::Down)]
}

// ---------------------------------------------------------------------------
// Credibility
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn credibility_stays_in_unit_interval(
        history in prop::collection::vec(any::<bool>(), 0..40),
        upvotes in any::<u32>(),
        downvotes in any::<u32>(),
        verified in any::<bool>(),
    ) {
        let calc = calculator_with_history(&history, CredibilityConfig::default());
        let result = calc.calculate_credibility("author", upvotes, downvotes, verified);
        prop_assert!((0.0..=1.0).contains(&result.score), "score {}", result.score);
    }

    #[test]
    fn credibility_stays_in_unit_interval_under_skewed_weights(
        w1 in 0.0f64..5.0,
        w2 in -5.0f64..5.0,
        w3 in -5.0f64..5.0,
        k in 0.0f64..10.0,
        upvotes in 0u32..10_000,
        downvotes in 0u32..10_000,
    ) {
        let config = CredibilityConfig {
            reputation_weight: w1,
            upvote_weight: w2,
            downvote_weight: w3,
            sigmoid_k: k,
            ..CredibilityConfig::default()
        };
        prop_assume!(config.weight_sum() > 0.0);
        let calc = calculator_with_history(&[], config);
        let score = calc.calculate_credibility("author", upvotes, downvotes, false).score;
        prop_assert!((0.0..=1.0).contains(&score), "score {}", score);
    }

    #[test]
    fn verified_reports_are_never_removed(score in -1.0f64..2.0, days in any::<u32>()) {
        let calc = calculator_with_history(&[], CredibilityConfig::default());
        prop_assert!(!calc.should_remove_report(score, days, true));
    }

    #[test]
    fn reputation_stays_in_unit_interval(history in prop::collection::vec(any::<bool>(), 0..200)) {
        let manager = ReputationManager::new(ReputationConfig::default());
        for outcome in &history {
            let r = manager.update_reputation("u", *outcome);
            prop_assert!((0.0..=1.0).contains(&r));
        }
    }
}

// ---------------------------------------------------------------------------
// Penalties and rewards
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn third_fake_alarm_is_always_permanent(low_posts in any::<u32>(), extra in 0u32..100) {
        let d = PenaltyEngine::default().check_penalty("u", low_posts, 3 + extra);
        prop_assert_eq!(d.ban, BanDuration::Permanent);
        prop_assert!(!d.can_post && !d.can_interact);
    }

    #[test]
    fn first_fake_alarm_overrides_shorter_post_penalties(low_posts in 0u32..10) {
        let d = PenaltyEngine::default().check_penalty("u", low_posts, 1);
        prop_assert_eq!(d.label, Some(PenaltyLabel::FakeAlarmBan));
        prop_assert_eq!(d.ban, BanDuration::Days(90));
    }

    #[test]
    fn permanent_post_ban_survives_a_finite_fake_alarm_ban(low_posts in 10u32..1000, fakes in 1u32..3) {
        let d = PenaltyEngine::default().check_penalty("u", low_posts, fakes);
        prop_assert_eq!(d.ban, BanDuration::Permanent);
    }

    #[test]
    fn no_fake_alarms_leave_post_penalty_alone(low_posts in any::<u32>()) {
        let engine = PenaltyEngine::default();
        let merged = engine.check_penalty("u", low_posts, 0);
        let fresh = engine.check_penalty("other", low_posts, 0);
        prop_assert_eq!(merged, fresh);
    }

    #[test]
    fn rewards_need_ten_posts(posts in 0u32..10, upvotes in any::<u64>()) {
        prop_assert_eq!(RewardEngine::default().calculate_reward("u", posts, upvotes).amount(), 0);
    }

    #[test]
    fn rewards_scale_linearly_once_eligible(posts in 10u32..10_000, upvotes in 50u64..1_000_000) {
        let d = RewardEngine::default().calculate_reward("u", posts, upvotes);
        prop_assert_eq!(d.amount(), u64::from(posts) * 1000);
    }
}

#[test]
fn threshold_author_earns_ten_thousand() {
    assert_eq!(RewardEngine::default().calculate_reward("u", 10, 50).amount(), 10_000);
}

// ---------------------------------------------------------------------------
// Duplicates
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn verdict_follows_best_similarity(s in 0.0f32..1.0, dlat in -0.019f64..0.019, dlon in -0.019f64..0.019) {
        let here = Coordinates::new(21.0, 105.8);
        let there = Coordinates::new(here.latitude + dlat, here.longitude + dlon);
        let candidates = [DuplicateCandidate {
            id: ReportId::from("old"),
            coordinates: there,
            embedding: vec![s, (1.0 - s * s).sqrt()],
        }];
        let verdict = DuplicateDetector::default().find_duplicate(&[1.0, 0.0], here, &candidates);
        let similarity = f64::from(s);
        // Keep clear of float noise right at the cut points.
        prop_assume!((similarity - 0.85).abs() > 1e-4 && (similarity - 0.70).abs() > 1e-4);
        match verdict {
            DuplicateVerdict::Duplicate { .. } => prop_assert!(similarity > 0.85),
            DuplicateVerdict::Related { .. } => prop_assert!(similarity > 0.70 && similarity < 0.85),
            DuplicateVerdict::Unique => prop_assert!(similarity < 0.70),
        }
    }

    #[test]
    fn candidates_outside_the_box_never_match(offset in 0.021f64..1.0, north in any::<bool>()) {
        let here = Coordinates::new(21.0, 105.8);
        let dlat = if north { offset } else { -offset };
        let candidates = [DuplicateCandidate {
            id: ReportId::from("far"),
            coordinates: Coordinates::new(here.latitude + dlat, here.longitude),
            embedding: vec![1.0, 0.0],
        }];
        let verdict = DuplicateDetector::default().find_duplicate(&[1.0, 0.0], here, &candidates);
        prop_assert_eq!(verdict, DuplicateVerdict::Unique);
    }
}

// ---------------------------------------------------------------------------
// Voting through the coordinator
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn vote_counts_match_last_vote_per_voter(
        votes in prop::collection::vec((0usize..6, vote_kind()), 1..40),
    ) {
        runtime().block_on(async {
            let node = memory_node(TrustConfig::default(), LifecycleConfig::default());
            let report = accepted(node.coordinator.submit(accident("author")).await.unwrap());

            let mut last: HashMap<usize, VoteKind> = HashMap::new();
            for (voter, kind) in &votes {
                let outcome = node
                    .coordinator
                    .cast_vote(&report.id, &format!("voter{voter}"), *kind)
                    .await
                    .unwrap();
                let repeated = last.insert(*voter, *kind) == Some(*kind);
                prop_assert_eq!(repeated, matches!(outcome, VoteOutcome::Unchanged(_)));
            }

            let stored = node.coordinator.get_report(&report.id).await.unwrap().unwrap();
            let ups = last.values().filter(|k| **k == VoteKind::Up).count() as u32;
            let downs = last.values().filter(|k| **k == VoteKind::Down).count() as u32;
            prop_assert_eq!(stored.upvotes, ups);
            prop_assert_eq!(stored.downvotes, downs);
            Ok::<_, TestCaseError>(())
        })?;
    }

    #[test]
    fn self_votes_are_rejected_at_any_count(
        prior in prop::collection::vec(vote_kind(), 0..8),
        kind in vote_kind(),
    ) {
        runtime().block_on(async {
            let node = memory_node(TrustConfig::default(), LifecycleConfig::default());
            let report = accepted(node.coordinator.submit(accident("author")).await.unwrap());
            for (i, k) in prior.iter().enumerate() {
                node.coordinator.cast_vote(&report.id, &format!("v{i}"), *k).await.unwrap();
            }
            let err = node.coordinator.cast_vote(&report.id, "author", kind).await.unwrap_err();
            prop_assert!(matches!(err, ReportError::InvalidOperation(_)));
            Ok::<_, TestCaseError>(())
        })?;
    }

    #[test]
    fn repeated_vote_fires_no_feedback(kind in vote_kind()) {
        runtime().block_on(async {
            let node = memory_node(TrustConfig::default(), LifecycleConfig::default());
            let report = accepted(node.coordinator.submit(accident("author")).await.unwrap());
            node.coordinator.cast_vote(&report.id, "v", kind).await.unwrap();
            let before = node.coordinator.reputation().get_user_stats("author");
            let score = node.coordinator.get_report(&report.id).await.unwrap().unwrap().reliability_score;

            let again = node.coordinator.cast_vote(&report.id, "v", kind).await.unwrap();
            prop_assert!(matches!(again, VoteOutcome::Unchanged(_)));
            prop_assert_eq!(again.report().reliability_score, score);
            prop_assert_eq!(node.coordinator.reputation().get_user_stats("author"), before);
            Ok::<_, TestCaseError>(())
        })?;
    }
}

// ---------------------------------------------------------------------------
// Rate limiting and concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sixth_attempt_in_window_is_denied_and_window_resets() {
    let node = memory_node(TrustConfig::default(), LifecycleConfig::default());
    let limiter = RateLimiter::new(node.store.clone(), RateLimitConfig::default());
    for _ in 0..5 {
        assert!(limiter.allow("u").await.unwrap());
    }
    assert!(!limiter.allow("u").await.unwrap());
    node.clock.advance_secs(60);
    assert!(limiter.allow("u").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_vote_switches_never_lose_or_double_count() {
    let node = memory_node(steep_trust(), LifecycleConfig::default());
    let report = accepted(node.coordinator.submit(accident("author")).await.unwrap());

    // Every voter votes up, then half switch down, all concurrently per voter.
    let mut tasks = Vec::new();
    for i in 0..24 {
        let coordinator = node.coordinator.clone();
        let id = report.id.clone();
        tasks.push(tokio::spawn(async move {
            let voter = format!("voter{i}");
            coordinator.cast_vote(&id, &voter, VoteKind::Up).await.unwrap();
            if i % 2 == 0 {
                coordinator.cast_vote(&id, &voter, VoteKind::Down).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stored = node.coordinator.get_report(&report.id).await.unwrap().unwrap();
    assert_eq!((stored.upvotes, stored.downvotes), (12, 12));

    // The verification transition fired at most once per direction.
    let stats = node.coordinator.reputation().get_user_stats("author");
    assert!(stats.correct_reports <= stats.incorrect_reports + 1);
}
