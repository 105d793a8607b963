//! RocksDB-backed persistent report storage.
//!
//! Implements [`ReportStore`], [`CounterStore`], and [`CandidateRepository`]
//! using one column family per record kind. Reports and counters are
//! wrapped in an envelope carrying an optional expiry; expired entries read
//! as absent and are physically removed by [`RocksStore::purge_expired`].
//!
//! Read-modify-write operations (counter increments, fake-alarm commits,
//! retention-preserving writes) are serialized by a store-wide mutex;
//! multi-key writes go through a [`WriteBatch`]. Duplicate-candidate scans
//! read from a RocksDB snapshot.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use tracing::{debug, info};

use crowdwatch_core::error::StoreError;
use crowdwatch_core::time::{Clock, SystemClock};
use crowdwatch_core::traits::{CandidateRepository, CounterStore, ReportStore, Retention};
use crowdwatch_core::types::{
    Coordinates, DuplicateCandidate, Report, ReportId, ReportStatus, VoteKind,
};

// --- Column family names ---

const CF_REPORTS: &str = "reports";
const CF_VOTES: &str = "votes";
const CF_COUNTERS: &str = "counters";
const CF_AUTHOR_INDEX: &str = "author_index";
const CF_FAKE_ALARMS: &str = "fake_alarms";

const ALL_CFS: &[&str] = &[
    CF_REPORTS,
    CF_VOTES,
    CF_COUNTERS,
    CF_AUTHOR_INDEX,
    CF_FAKE_ALARMS,
];

/// Separates components of composite keys. User and report ids never
/// contain a NUL byte.
const KEY_SEP: u8 = 0;

#[derive(bincode::Encode, bincode::Decode)]
struct StoredReport {
    expires_at: Option<i64>,
    report: Report,
}

#[derive(bincode::Encode, bincode::Decode)]
struct StoredCounter {
    value: u64,
    expires_at: i64,
}

fn backend(e: rocksdb::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::Codec(e.to_string()))
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::Codec(e.to_string()))?;
    Ok(value)
}

fn composite_key(a: &str, b: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(a.len() + b.len() + 1);
    key.extend_from_slice(a.as_bytes());
    key.push(KEY_SEP);
    key.extend_from_slice(b.as_bytes());
    key
}

fn is_live(expires_at: Option<i64>, now: i64) -> bool {
    expires_at.is_none_or(|t| now < t)
}

/// RocksDB-backed implementation of the storage traits.
pub struct RocksStore {
    db: DB,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a database at `path` on the system clock.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    /// Open or create a database at `path`, creating missing column families.
    pub fn open_with_clock(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors).map_err(backend)?;
        info!(path = %path.as_ref().display(), "storage: opened rocksdb");

        Ok(Self {
            db,
            clock,
            write_lock: Mutex::new(()),
        })
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        for name in ALL_CFS {
            let cf = self.cf_handle(name)?;
            self.db.flush_cf(cf).map_err(backend)?;
        }
        Ok(())
    }

    /// Delete every expired report (with its author-index entry) and counter.
    ///
    /// Returns the number of records removed.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock();
        let now = self.clock.now();
        let cf_reports = self.cf_handle(CF_REPORTS)?;
        let cf_index = self.cf_handle(CF_AUTHOR_INDEX)?;
        let cf_counters = self.cf_handle(CF_COUNTERS)?;
        let mut batch = WriteBatch::default();
        let mut removed = 0;

        for item in self.db.iterator_cf(cf_reports, IteratorMode::Start) {
            let (key, value) = item.map_err(backend)?;
            let stored: StoredReport = decode(&value)?;
            if !is_live(stored.expires_at, now) {
                batch.delete_cf(cf_reports, &key);
                batch.delete_cf(
                    cf_index,
                    composite_key(&stored.report.author, stored.report.id.as_str()),
                );
                removed += 1;
            }
        }
        for item in self.db.iterator_cf(cf_counters, IteratorMode::Start) {
            let (key, value) = item.map_err(backend)?;
            let stored: StoredCounter = decode(&value)?;
            if !is_live(Some(stored.expires_at), now) {
                batch.delete_cf(cf_counters, &key);
                removed += 1;
            }
        }

        self.db.write(batch).map_err(backend)?;
        if removed > 0 {
            debug!(removed, "storage: purged expired records");
        }
        Ok(removed)
    }

    /// Expiry of a stored report, `None` if it never expires or is absent.
    pub fn report_expiry(&self, id: &ReportId) -> Result<Option<i64>, StoreError> {
        Ok(self.load_report(id)?.and_then(|s| s.expires_at))
    }

    // --- Internal helpers ---

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family: {name}")))
    }

    fn load_report(&self, id: &ReportId) -> Result<Option<StoredReport>, StoreError> {
        let cf = self.cf_handle(CF_REPORTS)?;
        match self.db.get_cf(cf, id.as_str().as_bytes()).map_err(backend)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Expiry for a write over `id`. Refuses to write over an expired copy,
    /// and refuses [`Retention::Keep`] when nothing is stored.
    fn resolve_expiry(&self, id: &ReportId, retention: Retention) -> Result<Option<i64>, StoreError> {
        let now = self.clock.now();
        let stored = self.load_report(id)?;
        let expired = stored.as_ref().is_some_and(|s| !is_live(s.expires_at, now));
        if expired || (retention == Retention::Keep && stored.is_none()) {
            return Err(StoreError::Missing(id.to_string()));
        }
        Ok(match retention {
            Retention::Keep => stored.and_then(|s| s.expires_at),
            Retention::Persist => None,
            Retention::ExpireAfter(secs) => Some(now.saturating_add(secs as i64)),
        })
    }

    fn stage_report(
        &self,
        batch: &mut WriteBatch,
        report: &Report,
        expires_at: Option<i64>,
    ) -> Result<(), StoreError> {
        let stored = StoredReport {
            expires_at,
            report: report.clone(),
        };
        batch.put_cf(self.cf_handle(CF_REPORTS)?, report.id.as_str().as_bytes(), encode(&stored)?);
        batch.put_cf(
            self.cf_handle(CF_AUTHOR_INDEX)?,
            composite_key(&report.author, report.id.as_str()),
            b"",
        );
        Ok(())
    }

    fn read_u32(&self, cf_name: &str, key: &[u8]) -> Result<u32, StoreError> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(cf, key).map_err(backend)? {
            Some(bytes) => decode(&bytes),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl CounterStore for RocksStore {
    async fn incr_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock();
        let now = self.clock.now();
        let cf = self.cf_handle(CF_COUNTERS)?;
        let current = match self.db.get_cf(cf, key.as_bytes()).map_err(backend)? {
            Some(bytes) => {
                let stored: StoredCounter = decode(&bytes)?;
                is_live(Some(stored.expires_at), now).then_some(stored)
            }
            None => None,
        };
        let next = match current {
            Some(stored) => StoredCounter {
                value: stored.value.saturating_add(1),
                expires_at: stored.expires_at,
            },
            None => StoredCounter {
                value: 1,
                expires_at: now.saturating_add(ttl_secs as i64),
            },
        };
        self.db.put_cf(cf, key.as_bytes(), encode(&next)?).map_err(backend)?;
        Ok(next.value)
    }
}

#[async_trait]
impl ReportStore for RocksStore {
    async fn get_report(&self, id: &ReportId) -> Result<Option<Report>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .load_report(id)?
            .filter(|s| is_live(s.expires_at, now))
            .map(|s| s.report))
    }

    async fn put_report(&self, report: &Report, retention: Retention) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let expires_at = self.resolve_expiry(&report.id, retention)?;
        let mut batch = WriteBatch::default();
        self.stage_report(&mut batch, report, expires_at)?;
        self.db.write(batch).map_err(backend)
    }

    async fn get_vote(&self, voter: &str, report: &ReportId) -> Result<Option<VoteKind>, StoreError> {
        let cf = self.cf_handle(CF_VOTES)?;
        match self
            .db
            .get_cf(cf, composite_key(voter, report.as_str()))
            .map_err(backend)?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn commit_vote(
        &self,
        report: &Report,
        voter: &str,
        kind: VoteKind,
        retention: Retention,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let expires_at = self.resolve_expiry(&report.id, retention)?;
        let mut batch = WriteBatch::default();
        self.stage_report(&mut batch, report, expires_at)?;
        batch.put_cf(
            self.cf_handle(CF_VOTES)?,
            composite_key(voter, report.id.as_str()),
            encode(&kind)?,
        );
        self.db.write(batch).map_err(backend)
    }

    async fn reports_by_author(&self, author: &str) -> Result<Vec<Report>, StoreError> {
        let cf = self.cf_handle(CF_AUTHOR_INDEX)?;
        let mut prefix = author.as_bytes().to_vec();
        prefix.push(KEY_SEP);
        let now = self.clock.now();

        let mut reports = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item.map_err(backend)?;
            if !key.starts_with(&prefix) {
                break;
            }
            let id = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            if let Some(stored) = self.load_report(&ReportId(id))? {
                if is_live(stored.expires_at, now) {
                    reports.push(stored.report);
                }
            }
        }
        Ok(reports)
    }

    async fn commit_fake_alarm(&self, report: &Report) -> Result<u32, StoreError> {
        let _guard = self.write_lock.lock();
        let expires_at = self.resolve_expiry(&report.id, Retention::Keep)?;
        let count = self
            .read_u32(CF_FAKE_ALARMS, report.author.as_bytes())?
            .saturating_add(1);
        let mut batch = WriteBatch::default();
        self.stage_report(&mut batch, report, expires_at)?;
        batch.put_cf(
            self.cf_handle(CF_FAKE_ALARMS)?,
            report.author.as_bytes(),
            encode(&count)?,
        );
        self.db.write(batch).map_err(backend)?;
        Ok(count)
    }

    async fn fake_alarm_count(&self, author: &str) -> Result<u32, StoreError> {
        self.read_u32(CF_FAKE_ALARMS, author.as_bytes())
    }
}

#[async_trait]
impl CandidateRepository for RocksStore {
    async fn candidates_near(
        &self,
        center: Coordinates,
        tolerance_deg: f64,
    ) -> Result<Vec<DuplicateCandidate>, StoreError> {
        let cf = self.cf_handle(CF_REPORTS)?;
        let snapshot = self.db.snapshot();
        let now = self.clock.now();

        let mut found = Vec::new();
        for item in snapshot.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item.map_err(backend)?;
            let stored: StoredReport = decode(&value)?;
            let r = &stored.report;
            if is_live(stored.expires_at, now)
                && r.status != ReportStatus::Deleted
                && center.within_box(&r.coordinates, tolerance_deg)
            {
                found.push(DuplicateCandidate::from(r));
            }
        }
        Ok(found)
    }
}
