//! Domain records for community incident reports.
//!
//! [`Report`] is the single persisted record type. It is encoded once at the
//! storage boundary with [`encode_report`] / [`decode_report`] (bincode,
//! standard config) so that no layer parses individual fields by hand.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Identifier of a submitting or voting user.
pub type UserId = String;

/// Unique identifier of a report.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, bincode::Encode,
    bincode::Decode,
)]
#[serde(transparent)]
pub struct ReportId(pub String);

impl ReportId {
    /// Allocate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReportId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A point on the map in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `true` if `other` lies strictly inside the square of
    /// half-width `tolerance_deg` centred on `self`.
    pub fn within_box(&self, other: &Coordinates, tolerance_deg: f64) -> bool {
        (self.latitude - other.latitude).abs() < tolerance_deg
            && (self.longitude - other.longitude).abs() < tolerance_deg
    }
}

/// Lifecycle state of a report.
///
/// ```text
/// pending_verification <──> verified_community
///          │                      │
///          └──> unverified_low_score <── (any non-terminal)
///                                 deleted (terminal)
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, bincode::Encode,
    bincode::Decode,
)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    PendingVerification,
    VerifiedCommunity,
    UnverifiedLowScore,
    Deleted,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingVerification => "pending_verification",
            Self::VerifiedCommunity => "verified_community",
            Self::UnverifiedLowScore => "unverified_low_score",
            Self::Deleted => "deleted",
        }
    }

    /// Deleted reports accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a community vote.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, bincode::Encode,
    bincode::Decode,
)]
#[serde(rename_all = "snake_case")]
pub enum VoteKind {
    Up,
    Down,
}

impl VoteKind {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// Output of the classification collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub embedding: Vec<f32>,
    pub topic: String,
    pub urgency: String,
}

/// A persisted community report.
///
/// Vote counters are unsigned and only ever adjusted with saturating
/// arithmetic. `reliability_score` is always the output of the credibility
/// calculator for the current counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Report {
    pub id: ReportId,
    pub author: UserId,
    /// Normalized text that passed the content filter.
    pub text: String,
    pub location_text: Option<String>,
    pub coordinates: Coordinates,
    pub embedding: Vec<f32>,
    pub topic: String,
    pub urgency: String,
    pub status: ReportStatus,
    pub reliability_score: f64,
    pub author_reputation_at_submit: f64,
    /// When the incident was observed, if the submitter said so (unix secs).
    pub observed_at: Option<i64>,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds.
    pub updated_at: i64,
    pub upvotes: u32,
    pub downvotes: u32,
    /// References to authoritative confirmations (news articles, agency bulletins).
    pub official_sources: Vec<String>,
}

impl Report {
    pub fn total_votes(&self) -> u32 {
        self.upvotes.saturating_add(self.downvotes)
    }

    /// Whole days elapsed between creation and `now` (unix secs), floored at 0.
    pub fn days_since_created(&self, now: i64) -> u32 {
        let secs = now.saturating_sub(self.created_at).max(0);
        (secs / crate::constants::SECS_PER_DAY).min(u32::MAX as i64) as u32
    }

    pub fn is_verified_by_authority(&self) -> bool {
        !self.official_sources.is_empty()
    }

    /// Move one vote from `previous` (if any) to `kind`.
    ///
    /// A switch decrements the old counter (floored at zero) and increments
    /// the new one; it never double-counts.
    pub fn apply_vote(&mut self, kind: VoteKind, previous: Option<VoteKind>) {
        if previous == Some(kind) {
            return;
        }
        match previous {
            Some(VoteKind::Up) => self.upvotes = self.upvotes.saturating_sub(1),
            Some(VoteKind::Down) => self.downvotes = self.downvotes.saturating_sub(1),
            None => {}
        }
        match kind {
            VoteKind::Up => self.upvotes = self.upvotes.saturating_add(1),
            VoteKind::Down => self.downvotes = self.downvotes.saturating_add(1),
        }
    }
}

/// Aggregated per-user counters that drive rewards and penalties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserActivity {
    pub high_credibility_posts: u32,
    pub low_credibility_posts: u32,
    pub total_upvotes: u64,
    pub fake_alarms: u32,
}

/// A previously persisted report considered by duplicate search.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateCandidate {
    pub id: ReportId,
    pub coordinates: Coordinates,
    pub embedding: Vec<f32>,
}

impl From<&Report> for DuplicateCandidate {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id.clone(),
            coordinates: report.coordinates,
            embedding: report.embedding.clone(),
        }
    }
}

/// Encode a report for storage.
pub fn encode_report(report: &Report) -> Result<Vec<u8>, StoreError> {
    bincode::encode_to_vec(report, bincode::config::standard())
        .map_err(|e| StoreError::Codec(e.to_string()))
}

/// Decode a report previously written with [`encode_report`].
pub fn decode_report(bytes: &[u8]) -> Result<Report, StoreError> {
    let (report, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::Codec(e.to_string()))?;
    Ok(report)
}
