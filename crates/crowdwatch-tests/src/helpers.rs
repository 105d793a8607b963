//! Shared test helpers for end-to-end and adversarial tests.

use std::path::Path;
use std::sync::Arc;

use crowdwatch_core::memory::MemoryStore;
use crowdwatch_core::time::ManualClock;
use crowdwatch_core::types::{Coordinates, Report};
use crowdwatch_node_lib::collaborators::{GazetteerGeocoder, LexiconClassifier};
use crowdwatch_node_lib::coordinator::{
    LifecycleConfig, ReportLifecycleCoordinator, SubmissionOutcome, SubmissionRequest,
};
use crowdwatch_node_lib::storage::RocksStore;
use crowdwatch_trust::config::TrustConfig;

/// Start of simulated time for every test node.
pub const T0: i64 = 1_700_000_000;

/// Admissible report text: names a place the default gazetteer knows and
/// says when it happened.
pub const ACCIDENT_TEXT: &str = "Tai nạn giao thông nghiêm trọng tại ngã tư Láng Hạ hôm nay";

/// A coordinator over an in-memory store on a manual clock.
pub struct MemoryNode {
    pub store: Arc<MemoryStore>,
    pub clock: ManualClock,
    pub coordinator: Arc<ReportLifecycleCoordinator>,
}

/// Build a node with the built-in collaborators.
pub fn memory_node(trust: TrustConfig, lifecycle: LifecycleConfig) -> MemoryNode {
    let clock = ManualClock::new(T0);
    let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
    let coordinator = ReportLifecycleCoordinator::new(
        store.clone(),
        Arc::new(GazetteerGeocoder::default()),
        Arc::new(LexiconClassifier::default()),
        Arc::new(clock.clone()),
        trust,
        lifecycle,
    )
    .unwrap();
    MemoryNode {
        store,
        clock,
        coordinator: Arc::new(coordinator),
    }
}

/// A coordinator over a RocksDB store at `path`.
pub fn rocks_node(
    path: &Path,
    clock: ManualClock,
    trust: TrustConfig,
) -> (Arc<RocksStore>, Arc<ReportLifecycleCoordinator>) {
    let store = Arc::new(RocksStore::open_with_clock(path, Arc::new(clock.clone())).unwrap());
    let coordinator = ReportLifecycleCoordinator::new(
        store.clone(),
        Arc::new(GazetteerGeocoder::default()),
        Arc::new(LexiconClassifier::default()),
        Arc::new(clock),
        trust,
        LifecycleConfig::default(),
    )
    .unwrap();
    (store, Arc::new(coordinator))
}

/// Credibility weights under which three upvotes verify a fresh report.
pub fn steep_trust() -> TrustConfig {
    let mut trust = TrustConfig::default();
    trust.credibility.reputation_weight = 0.1;
    trust.credibility.upvote_weight = 0.9;
    trust.credibility.downvote_weight = 0.0;
    trust.credibility.sigmoid_k = 1.0;
    trust
}

/// A submission of [`ACCIDENT_TEXT`] resolved through the gazetteer.
pub fn accident(author: &str) -> SubmissionRequest {
    SubmissionRequest {
        author: author.to_string(),
        text: ACCIDENT_TEXT.to_string(),
        ..SubmissionRequest::default()
    }
}

/// A submission pinned to its own location, far from every other slot.
pub fn accident_at(author: &str, slot: u32) -> SubmissionRequest {
    SubmissionRequest {
        coordinates: Some(Coordinates::new(10.0 + f64::from(slot) * 0.1, 106.0)),
        ..accident(author)
    }
}

/// Unwrap an accepted submission.
pub fn accepted(outcome: SubmissionOutcome) -> Report {
    match outcome {
        SubmissionOutcome::Accepted { report, .. } => report,
        other => panic!("expected acceptance, got {} ({})", other.code(), other.message()),
    }
}
