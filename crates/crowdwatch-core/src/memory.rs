//! In-memory key-value store with per-key expiry.
//!
//! [`MemoryStore`] implements every storage trait in [`crate::traits`] behind
//! one `RwLock`, which gives atomic vote commits and consistent snapshots for
//! duplicate search. It is suitable for tests and single-process demos; the
//! persistent node uses RocksDB (crowdwatch-node).
//!
//! Expiry is checked lazily on read against the injected [`Clock`], the same
//! way a TTL-capable server hides expired keys.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::time::{Clock, SystemClock};
use crate::traits::{CandidateRepository, CounterStore, ReportStore, Retention};
use crate::types::{Coordinates, DuplicateCandidate, Report, ReportId, ReportStatus, VoteKind};

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    /// Unix seconds; `None` never expires.
    expires_at: Option<i64>,
}

impl<T> Expiring<T> {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|t| now < t)
    }
}

#[derive(Default)]
struct Inner {
    reports: HashMap<ReportId, Expiring<Report>>,
    votes: HashMap<(String, ReportId), VoteKind>,
    counters: HashMap<String, Expiring<u64>>,
    fake_alarms: HashMap<String, u32>,
}

/// Thread-safe in-memory implementation of the storage traits.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            clock,
        }
    }

    /// Number of live reports.
    pub fn report_count(&self) -> usize {
        let now = self.clock.now();
        self.inner
            .read()
            .reports
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    /// Expiry of a report in unix seconds, `None` if it never expires or is unknown.
    pub fn report_expiry(&self, id: &ReportId) -> Option<i64> {
        self.inner.read().reports.get(id).and_then(|e| e.expires_at)
    }

    /// Drop every expired report and counter. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let before = inner.reports.len() + inner.counters.len();
        inner.reports.retain(|_, e| e.is_live(now));
        inner.counters.retain(|_, e| e.is_live(now));
        let removed = before - inner.reports.len() - inner.counters.len();
        if removed > 0 {
            debug!(removed, "memory_store: purged expired keys");
        }
        removed
    }

    /// Expiry for a write of `id` under `retention`.
    ///
    /// A stored copy that has already expired is never overwritten, and
    /// `Keep` needs a live stored copy to keep the expiry of.
    fn resolve_expiry(&self, inner: &Inner, id: &ReportId, retention: Retention) -> Result<Option<i64>, StoreError> {
        let now = self.clock.now();
        let stored = inner.reports.get(id);
        let expired = stored.is_some_and(|e| !e.is_live(now));
        if expired || (retention == Retention::Keep && stored.is_none()) {
            return Err(StoreError::Missing(id.to_string()));
        }
        Ok(match retention {
            Retention::Keep => stored.and_then(|e| e.expires_at),
            Retention::Persist => None,
            Retention::ExpireAfter(secs) => Some(now.saturating_add(secs as i64)),
        })
    }

    fn write_report(inner: &mut Inner, report: &Report, expires_at: Option<i64>) {
        inner.reports.insert(
            report.id.clone(),
            Expiring {
                value: report.clone(),
                expires_at,
            },
        );
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn incr_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let entry = inner
            .counters
            .entry(key.to_string())
            .or_insert(Expiring {
                value: 0,
                expires_at: None,
            });
        if !entry.is_live(now) {
            entry.value = 0;
            entry.expires_at = None;
        }
        entry.value = entry.value.saturating_add(1);
        if entry.value == 1 {
            entry.expires_at = Some(now.saturating_add(ttl_secs as i64));
        }
        Ok(entry.value)
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn get_report(&self, id: &ReportId) -> Result<Option<Report>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .inner
            .read()
            .reports
            .get(id)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn put_report(&self, report: &Report, retention: Retention) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let expires_at = self.resolve_expiry(&inner, &report.id, retention)?;
        Self::write_report(&mut inner, report, expires_at);
        Ok(())
    }

    async fn get_vote(&self, voter: &str, report: &ReportId) -> Result<Option<VoteKind>, StoreError> {
        Ok(self
            .inner
            .read()
            .votes
            .get(&(voter.to_string(), report.clone()))
            .copied())
    }

    async fn commit_vote(
        &self,
        report: &Report,
        voter: &str,
        kind: VoteKind,
        retention: Retention,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let expires_at = self.resolve_expiry(&inner, &report.id, retention)?;
        Self::write_report(&mut inner, report, expires_at);
        inner
            .votes
            .insert((voter.to_string(), report.id.clone()), kind);
        Ok(())
    }

    async fn reports_by_author(&self, author: &str) -> Result<Vec<Report>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .inner
            .read()
            .reports
            .values()
            .filter(|e| e.is_live(now) && e.value.author == author)
            .map(|e| e.value.clone())
            .collect())
    }

    async fn commit_fake_alarm(&self, report: &Report) -> Result<u32, StoreError> {
        let mut inner = self.inner.write();
        let expires_at = self.resolve_expiry(&inner, &report.id, Retention::Keep)?;
        Self::write_report(&mut inner, report, expires_at);
        let count = inner.fake_alarms.entry(report.author.clone()).or_insert(0);
        *count = count.saturating_add(1);
        Ok(*count)
    }

    async fn fake_alarm_count(&self, author: &str) -> Result<u32, StoreError> {
        Ok(self.inner.read().fake_alarms.get(author).copied().unwrap_or(0))
    }
}

#[async_trait]
impl CandidateRepository for MemoryStore {
    async fn candidates_near(
        &self,
        center: Coordinates,
        tolerance_deg: f64,
    ) -> Result<Vec<DuplicateCandidate>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .inner
            .read()
            .reports
            .values()
            .filter(|e| e.is_live(now))
            .map(|e| &e.value)
            .filter(|r| r.status != ReportStatus::Deleted)
            .filter(|r| center.within_box(&r.coordinates, tolerance_deg))
            .map(DuplicateCandidate::from)
            .collect())
    }
}
