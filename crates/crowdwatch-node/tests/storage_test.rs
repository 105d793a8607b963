//! RocksDB store tests against a temporary directory.

use std::sync::Arc;

use crowdwatch_core::error::StoreError;
use crowdwatch_core::time::ManualClock;
use crowdwatch_core::traits::{CandidateRepository, CounterStore, ReportStore, Retention};
use crowdwatch_core::types::{Coordinates, Report, ReportId, ReportStatus, VoteKind};
use crowdwatch_node_lib::storage::RocksStore;

const START: i64 = 1_700_000_000;

fn here() -> Coordinates {
    Coordinates::new(21.0167, 105.8163)
}

fn make_report(id: &str, author: &str, coordinates: Coordinates) -> Report {
    Report {
        id: ReportId::from(id),
        author: author.to_string(),
        text: "Tai nạn giao thông ở ngã tư Láng Hạ hôm nay".to_string(),
        location_text: Some("Láng Hạ".to_string()),
        coordinates,
        embedding: vec![0.6, 0.8],
        topic: "giao_thong".to_string(),
        urgency: "trung_binh".to_string(),
        status: ReportStatus::PendingVerification,
        reliability_score: 0.3,
        author_reputation_at_submit: 0.5,
        observed_at: None,
        created_at: START,
        updated_at: START,
        upvotes: 0,
        downvotes: 0,
        official_sources: vec![],
    }
}

fn open_store(dir: &tempfile::TempDir) -> (RocksStore, ManualClock) {
    let clock = ManualClock::new(START);
    let store = RocksStore::open_with_clock(dir.path().join("reports"), Arc::new(clock.clone())).unwrap();
    (store, clock)
}

#[tokio::test]
async fn report_round_trips_through_rocksdb() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = open_store(&dir);
    let report = make_report("r1", "alice", here());

    store.put_report(&report, Retention::Persist).await.unwrap();
    assert_eq!(store.get_report(&report.id).await.unwrap(), Some(report));
    assert_eq!(store.get_report(&ReportId::from("missing")).await.unwrap(), None);
}

#[tokio::test]
async fn reports_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let report = make_report("r1", "alice", here());
    {
        let (store, _) = open_store(&dir);
        store.put_report(&report, Retention::Persist).await.unwrap();
        store.commit_vote(&report, "bob", VoteKind::Up, Retention::Keep).await.unwrap();
        store.commit_fake_alarm(&report).await.unwrap();
        store.flush().unwrap();
    }
    let (store, _) = open_store(&dir);
    assert!(store.get_report(&report.id).await.unwrap().is_some());
    assert_eq!(store.get_vote("bob", &report.id).await.unwrap(), Some(VoteKind::Up));
    assert_eq!(store.fake_alarm_count("alice").await.unwrap(), 1);
}

#[tokio::test]
async fn expired_report_reads_as_absent_and_is_purged() {
    let dir = tempfile::tempdir().unwrap();
    let (store, clock) = open_store(&dir);
    let report = make_report("r1", "alice", here());
    store.put_report(&report, Retention::ExpireAfter(100)).await.unwrap();
    assert_eq!(store.report_expiry(&report.id).unwrap(), Some(START + 100));

    clock.advance_secs(99);
    assert!(store.get_report(&report.id).await.unwrap().is_some());

    clock.advance_secs(1);
    assert!(store.get_report(&report.id).await.unwrap().is_none());
    assert!(store.reports_by_author("alice").await.unwrap().is_empty());
    assert_eq!(store.purge_expired().unwrap(), 1);
    assert_eq!(store.report_expiry(&report.id).unwrap(), None);
}

#[tokio::test]
async fn keep_retention_preserves_expiry_and_persist_clears_it() {
    let dir = tempfile::tempdir().unwrap();
    let (store, clock) = open_store(&dir);
    let mut report = make_report("r1", "alice", here());
    store.put_report(&report, Retention::ExpireAfter(100)).await.unwrap();

    clock.advance_secs(10);
    report.upvotes = 1;
    store.commit_vote(&report, "bob", VoteKind::Up, Retention::Keep).await.unwrap();
    assert_eq!(store.report_expiry(&report.id).unwrap(), Some(START + 100));

    store.put_report(&report, Retention::Persist).await.unwrap();
    assert_eq!(store.report_expiry(&report.id).unwrap(), None);
}

#[tokio::test]
async fn commit_vote_writes_report_and_vote_together() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = open_store(&dir);
    let mut report = make_report("r1", "alice", here());
    store.put_report(&report, Retention::Persist).await.unwrap();

    report.apply_vote(VoteKind::Down, None);
    store.commit_vote(&report, "bob", VoteKind::Down, Retention::Keep).await.unwrap();

    let stored = store.get_report(&report.id).await.unwrap().unwrap();
    assert_eq!(stored.downvotes, 1);
    assert_eq!(store.get_vote("bob", &report.id).await.unwrap(), Some(VoteKind::Down));
    assert_eq!(store.get_vote("carol", &report.id).await.unwrap(), None);
}

#[tokio::test]
async fn counter_window_resets_after_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let (store, clock) = open_store(&dir);

    assert_eq!(store.incr_with_ttl("k", 60).await.unwrap(), 1);
    clock.advance_secs(30);
    assert_eq!(store.incr_with_ttl("k", 60).await.unwrap(), 2);
    clock.advance_secs(30);
    assert_eq!(store.incr_with_ttl("k", 60).await.unwrap(), 1);
    assert_eq!(store.incr_with_ttl("other", 60).await.unwrap(), 1);
}

#[tokio::test]
async fn author_index_separates_authors_sharing_a_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = open_store(&dir);
    store.put_report(&make_report("a1", "al", here()), Retention::Persist).await.unwrap();
    store.put_report(&make_report("a2", "alice", here()), Retention::Persist).await.unwrap();
    store.put_report(&make_report("a3", "alice", here()), Retention::Persist).await.unwrap();

    let mut ids: Vec<String> = store
        .reports_by_author("alice")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id.0)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["a2", "a3"]);
    assert_eq!(store.reports_by_author("al").await.unwrap().len(), 1);
}

#[tokio::test]
async fn candidates_exclude_distant_and_deleted_reports() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = open_store(&dir);
    let near = make_report("near", "alice", here());
    let far = make_report("far", "alice", Coordinates::new(21.1, 105.8163));
    let mut gone = make_report("gone", "alice", here());
    gone.status = ReportStatus::Deleted;
    for r in [&near, &far, &gone] {
        store.put_report(r, Retention::Persist).await.unwrap();
    }

    let found = store.candidates_near(here(), 0.02).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, near.id);
    assert_eq!(found[0].embedding, near.embedding);
}

#[tokio::test]
async fn fake_alarm_commit_writes_report_and_counter_together() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = open_store(&dir);
    let mut first = make_report("f1", "mallory", here());
    let second = make_report("f2", "mallory", here());
    store.put_report(&first, Retention::ExpireAfter(100)).await.unwrap();
    store.put_report(&second, Retention::Persist).await.unwrap();
    assert_eq!(store.fake_alarm_count("mallory").await.unwrap(), 0);

    first.status = ReportStatus::Deleted;
    assert_eq!(store.commit_fake_alarm(&first).await.unwrap(), 1);
    assert_eq!(store.commit_fake_alarm(&second).await.unwrap(), 2);

    let stored = store.get_report(&first.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReportStatus::Deleted);
    assert_eq!(store.report_expiry(&first.id).unwrap(), Some(START + 100));
    assert_eq!(store.fake_alarm_count("mallory").await.unwrap(), 2);
}

#[tokio::test]
async fn fake_alarm_on_expired_report_counts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (store, clock) = open_store(&dir);
    let report = make_report("f1", "mallory", here());
    store.put_report(&report, Retention::ExpireAfter(100)).await.unwrap();

    clock.advance_secs(100);
    assert!(matches!(
        store.commit_fake_alarm(&report).await,
        Err(StoreError::Missing(id)) if id == "f1"
    ));
    assert_eq!(store.fake_alarm_count("mallory").await.unwrap(), 0);
    assert!(matches!(
        store.commit_fake_alarm(&make_report("never", "mallory", here())).await,
        Err(StoreError::Missing(_))
    ));
    assert_eq!(store.fake_alarm_count("mallory").await.unwrap(), 0);
}

#[tokio::test]
async fn writes_never_revive_an_expired_report() {
    let dir = tempfile::tempdir().unwrap();
    let (store, clock) = open_store(&dir);
    let mut report = make_report("r1", "alice", here());
    store.put_report(&report, Retention::ExpireAfter(100)).await.unwrap();

    clock.advance_secs(150);
    report.upvotes = 1;
    assert!(matches!(
        store.commit_vote(&report, "bob", VoteKind::Up, Retention::Keep).await,
        Err(StoreError::Missing(_))
    ));
    assert!(matches!(
        store.put_report(&report, Retention::Keep).await,
        Err(StoreError::Missing(_))
    ));
    assert!(matches!(
        store.put_report(&report, Retention::Persist).await,
        Err(StoreError::Missing(_))
    ));
    assert_eq!(store.get_vote("bob", &report.id).await.unwrap(), None);

    clock.advance_secs(365 * 24 * 3600);
    assert!(store.get_report(&report.id).await.unwrap().is_none());
    assert_eq!(store.report_expiry(&report.id).unwrap(), Some(START + 100));
}

#[tokio::test]
async fn keep_write_after_purge_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let (store, clock) = open_store(&dir);
    let report = make_report("r1", "alice", here());
    store.put_report(&report, Retention::ExpireAfter(100)).await.unwrap();

    clock.advance_secs(100);
    assert_eq!(store.purge_expired().unwrap(), 1);
    assert!(matches!(
        store.put_report(&report, Retention::Keep).await,
        Err(StoreError::Missing(_))
    ));
    assert!(store.get_report(&report.id).await.unwrap().is_none());
    assert!(store.reports_by_author("alice").await.unwrap().is_empty());
}
