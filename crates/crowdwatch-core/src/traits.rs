//! Trait interfaces for the collaborators of the trust pipeline.
//!
//! These traits define the contracts between crates:
//! - [`CounterStore`]: atomic TTL counters (rate limiting)
//! - [`ReportStore`]: report and vote records (memory and RocksDB implement)
//! - [`CandidateRepository`]: geo-bounded scan for duplicate search
//! - [`Geocoder`]: place name to coordinates (external service)
//! - [`Classifier`]: embedding, topic, and urgency (external model)
//!
//! Every method is async: these are the only points where the pipeline may
//! suspend, and the coordinator bounds the external ones with a timeout.

use async_trait::async_trait;

use crate::error::{ClassifyError, GeocodeError, StoreError};
use crate::types::{
    Classification, Coordinates, DuplicateCandidate, Report, ReportId, VoteKind,
};

/// How a write should treat the record's time-to-live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Leave the existing expiry untouched; the record must exist.
    Keep,
    /// Remove the expiry; the record lives until deleted.
    Persist,
    /// Expire this many seconds from now.
    ExpireAfter(u64),
}

/// Atomic counters with a per-key expiry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` and return the post-increment value.
    ///
    /// The first increment of a fresh (or expired) key sets its expiry to
    /// `ttl_secs` from now; later increments inside the window leave the
    /// expiry alone. Concurrent callers on the same key never lose counts.
    async fn incr_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError>;
}

/// Persistent report and vote records.
///
/// The lifecycle coordinator is the only writer.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Look up a report. Expired reports are reported as absent.
    async fn get_report(&self, id: &ReportId) -> Result<Option<Report>, StoreError>;

    /// Write a report with the given retention.
    ///
    /// Fails with [`StoreError::Missing`] if the stored copy has expired, or
    /// if `retention` is [`Retention::Keep`] and there is no stored copy.
    /// Expired reports are never brought back.
    async fn put_report(&self, report: &Report, retention: Retention) -> Result<(), StoreError>;

    /// The voter's current vote on a report, if any.
    async fn get_vote(&self, voter: &str, report: &ReportId) -> Result<Option<VoteKind>, StoreError>;

    /// Write the updated report and the voter's vote as one atomic unit.
    ///
    /// Expiry rules are those of [`ReportStore::put_report`].
    async fn commit_vote(
        &self,
        report: &Report,
        voter: &str,
        kind: VoteKind,
        retention: Retention,
    ) -> Result<(), StoreError>;

    /// All live reports written by `author`.
    async fn reports_by_author(&self, author: &str) -> Result<Vec<Report>, StoreError>;

    /// Write the report (keeping its expiry) and increment its author's
    /// confirmed fake-alarm counter as one atomic unit, returning the new
    /// count. Nothing is written if the report is missing or expired.
    async fn commit_fake_alarm(&self, report: &Report) -> Result<u32, StoreError>;

    async fn fake_alarm_count(&self, author: &str) -> Result<u32, StoreError>;
}

/// Read-mostly scan over recent reports for duplicate search.
#[async_trait]
pub trait CandidateRepository: Send + Sync {
    /// Live, non-deleted reports whose coordinates fall strictly inside the
    /// box of half-width `tolerance_deg` around `center`, read from one
    /// consistent snapshot.
    async fn candidates_near(
        &self,
        center: Coordinates,
        tolerance_deg: f64,
    ) -> Result<Vec<DuplicateCandidate>, StoreError>;
}

/// Resolves free-text place names to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` means the service answered but knows no such place.
    async fn geocode(&self, location: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

/// Produces an embedding plus topic and urgency labels for report text.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifyError>;
}
