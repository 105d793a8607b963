//! Report lifecycle: submission, voting, and status transitions.
//!
//! The [`ReportLifecycleCoordinator`] is the only writer of report and vote
//! records. It composes the trust components with the storage and
//! collaborator traits:
//!
//! ```text
//! submit:    rate limit -> penalty gate -> content filter -> geocode
//!            -> classify -> duplicate search -> persist (with TTL)
//! cast_vote: lock report -> checks -> apply vote -> rescore
//!            -> status transition -> atomic commit -> reputation feedback
//! ```
//!
//! Every mutation of an existing report holds that report's async mutex, so
//! concurrent votes on one report are applied one at a time. Reputation
//! feedback is serialized per user by the reputation manager itself.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crowdwatch_core::constants::{COLLABORATOR_TIMEOUT_SECS, REPORT_EXPIRE_SECS_FOR_UNVERIFIED};
use crowdwatch_core::error::{ClassifyError, ConfigError, GeocodeError, ReportError, StoreError};
use crowdwatch_core::time::Clock;
use crowdwatch_core::traits::{
    CandidateRepository, Classifier, CounterStore, Geocoder, ReportStore, Retention,
};
use crowdwatch_core::types::{
    Coordinates, Report, ReportId, ReportStatus, UserActivity, VoteKind,
};
use crowdwatch_trust::config::TrustConfig;
use crowdwatch_trust::credibility::{CredibilityCalculator, CredibilityResult};
use crowdwatch_trust::duplicate::{DuplicateDetector, DuplicateVerdict};
use crowdwatch_trust::filter::{ContentFilter, FilterRejection, FilterVerdict, SuppliedContext};
use crowdwatch_trust::penalty::{PenaltyDecision, PenaltyEngine};
use crowdwatch_trust::rate_limiter::RateLimiter;
use crowdwatch_trust::reputation::ReputationManager;
use crowdwatch_trust::reward::{RewardDecision, RewardEngine};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Lifecycle timings and policy switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Time-to-live of reports that are not community-verified.
    pub unverified_ttl_secs: u64,
    /// Upper bound on each geocoder and classifier call.
    pub collaborator_timeout_secs: u64,
    /// Reject posts and votes from users whose penalty forbids them.
    pub enforce_penalties: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            unverified_ttl_secs: REPORT_EXPIRE_SECS_FOR_UNVERIFIED,
            collaborator_timeout_secs: COLLABORATOR_TIMEOUT_SECS,
            enforce_penalties: true,
        }
    }
}

impl LifecycleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.unverified_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lifecycle.unverified_ttl_secs",
                message: "must be positive".into(),
            });
        }
        if self.collaborator_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lifecycle.collaborator_timeout_secs",
                message: "must be positive".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// A new report as received from a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub author: String,
    pub text: String,
    #[serde(default)]
    pub location_text: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    /// When the incident was observed (unix secs).
    #[serde(default)]
    pub observed_at: Option<i64>,
}

/// Why a submission was turned away.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionRejection {
    RateLimitExceeded,
    PostingSuspended { reason: String },
    InvalidReport(FilterRejection),
    MissingGeolocation,
    GeocoderUnavailable { message: String },
    InsufficientNlpInfo,
    ClassifierUnavailable { message: String },
}

impl SubmissionRejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::PostingSuspended { .. } => "POSTING_SUSPENDED",
            Self::InvalidReport(_) => "INVALID_REPORT",
            Self::MissingGeolocation => "MISSING_GEOLOCATION",
            Self::GeocoderUnavailable { .. } => "GEOCODER_UNAVAILABLE",
            Self::InsufficientNlpInfo => "INSUFFICIENT_NLP_INFO",
            Self::ClassifierUnavailable { .. } => "CLASSIFIER_UNAVAILABLE",
        }
    }
}

impl fmt::Display for SubmissionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimitExceeded => f.write_str("too many reports, try again later"),
            Self::PostingSuspended { reason } => write!(f, "posting suspended: {reason}"),
            Self::InvalidReport(rejection) => write!(f, "invalid report: {rejection}"),
            Self::MissingGeolocation => f.write_str("could not determine the report location"),
            Self::GeocoderUnavailable { message } => write!(f, "geocoder unavailable: {message}"),
            Self::InsufficientNlpInfo => f.write_str("not enough information to classify the report"),
            Self::ClassifierUnavailable { message } => {
                write!(f, "classifier unavailable: {message}")
            }
        }
    }
}

/// An existing report the new one is related to but not a duplicate of.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedReport {
    pub id: ReportId,
    pub similarity: f64,
}

/// Result of [`ReportLifecycleCoordinator::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Accepted {
        report: Report,
        related_to: Option<RelatedReport>,
    },
    /// Same event as an existing report; nothing was stored.
    Duplicate { existing: ReportId, similarity: f64 },
    Rejected(SubmissionRejection),
}

impl SubmissionOutcome {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "SUCCESS",
            Self::Duplicate { .. } => "DUPLICATE_REPORT",
            Self::Rejected(rejection) => rejection.code(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Accepted { report, .. } => format!("report {} accepted", report.id),
            Self::Duplicate { existing, .. } => {
                format!("report duplicates existing report {existing}")
            }
            Self::Rejected(rejection) => rejection.to_string(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

// ---------------------------------------------------------------------------
// Mutations of existing reports
// ---------------------------------------------------------------------------

/// A status change and the reputation feedback it fired.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transition {
    pub from: ReportStatus,
    pub to: ReportStatus,
    /// `Some(true)` for a correct outcome, `Some(false)` for incorrect.
    pub reputation_feedback: Option<bool>,
}

/// A report after a persisted mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportUpdate {
    pub report: Report,
    pub transition: Option<Transition>,
}

/// Result of [`ReportLifecycleCoordinator::cast_vote`].
#[derive(Debug, Clone, PartialEq)]
pub enum VoteOutcome {
    Recorded(ReportUpdate),
    /// The voter already cast this exact vote; nothing changed.
    Unchanged(Report),
}

impl VoteOutcome {
    pub fn report(&self) -> &Report {
        match self {
            Self::Recorded(update) => &update.report,
            Self::Unchanged(report) => report,
        }
    }
}

/// Result of [`ReportLifecycleCoordinator::flag_fake_alarm`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FakeAlarmOutcome {
    pub update: ReportUpdate,
    /// The author's confirmed fake alarms, including this one.
    pub fake_alarms: u32,
    pub penalty: PenaltyDecision,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Orchestrates report submission, voting, and lifecycle transitions.
pub struct ReportLifecycleCoordinator {
    reports: Arc<dyn ReportStore>,
    candidates: Arc<dyn CandidateRepository>,
    geocoder: Arc<dyn Geocoder>,
    classifier: Arc<dyn Classifier>,
    clock: Arc<dyn Clock>,
    rate_limiter: RateLimiter,
    filter: ContentFilter,
    reputation: Arc<ReputationManager>,
    credibility: CredibilityCalculator,
    rewards: RewardEngine,
    penalties: PenaltyEngine,
    duplicates: DuplicateDetector,
    lifecycle: LifecycleConfig,
    report_locks: DashMap<ReportId, Arc<AsyncMutex<()>>>,
}

/// Held per-report mutex; drops its map entry when no one else wants it.
struct ReportLock<'a> {
    locks: &'a DashMap<ReportId, Arc<AsyncMutex<()>>>,
    id: ReportId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ReportLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl ReportLifecycleCoordinator {
    /// Build every trust component from `trust` over one shared store.
    ///
    /// Fails if any config section is invalid or a filter pattern does not
    /// compile.
    pub fn new<S>(
        store: Arc<S>,
        geocoder: Arc<dyn Geocoder>,
        classifier: Arc<dyn Classifier>,
        clock: Arc<dyn Clock>,
        trust: TrustConfig,
        lifecycle: LifecycleConfig,
    ) -> Result<Self, ConfigError>
    where
        S: ReportStore + CounterStore + CandidateRepository + 'static,
    {
        trust.validate()?;
        lifecycle.validate()?;

        let counters: Arc<dyn CounterStore> = store.clone();
        let candidates: Arc<dyn CandidateRepository> = store.clone();
        let reports: Arc<dyn ReportStore> = store;
        let reputation = Arc::new(ReputationManager::new(trust.reputation));

        Ok(Self {
            reports,
            candidates,
            geocoder,
            classifier,
            clock,
            rate_limiter: RateLimiter::new(counters, trust.rate_limit),
            filter: ContentFilter::new(trust.filter)?,
            credibility: CredibilityCalculator::new(reputation.clone(), trust.credibility),
            reputation,
            rewards: RewardEngine::new(trust.reward),
            penalties: PenaltyEngine::new(trust.penalty),
            duplicates: DuplicateDetector::new(trust.duplicate),
            lifecycle,
            report_locks: DashMap::new(),
        })
    }

    pub fn reputation(&self) -> &Arc<ReputationManager> {
        &self.reputation
    }

    pub fn lifecycle(&self) -> &LifecycleConfig {
        &self.lifecycle
    }

    pub async fn get_report(&self, id: &ReportId) -> Result<Option<Report>, StoreError> {
        self.reports.get_report(id).await
    }

    // --- Submission ---

    /// Run a new report through the submission pipeline.
    ///
    /// Admissibility failures come back as [`SubmissionOutcome::Rejected`];
    /// only storage failures are errors.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<SubmissionOutcome, ReportError> {
        let author = request.author.as_str();

        if !self.rate_limiter.allow(author).await? {
            return Ok(self.reject(author, SubmissionRejection::RateLimitExceeded));
        }

        if self.lifecycle.enforce_penalties {
            let penalty = self.penalty_for(author).await?;
            if !penalty.can_post {
                let reason = penalty.reason.unwrap_or_else(|| "active penalty".to_string());
                return Ok(self.reject(author, SubmissionRejection::PostingSuspended { reason }));
            }
        }

        let location_text = request
            .location_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let supplied = SuppliedContext {
            has_location: request.coordinates.is_some() || location_text.is_some(),
            has_time: request.observed_at.is_some(),
        };
        let (text, info) = match self.filter.check(&request.text, supplied) {
            FilterVerdict::Accepted { text, info } => (text, info),
            FilterVerdict::Rejected(rejection) => {
                return Ok(self.reject(author, SubmissionRejection::InvalidReport(rejection)));
            }
        };

        let coordinates = match request.coordinates {
            Some(coordinates) => coordinates,
            None => {
                let queries: Vec<&str> = location_text
                    .into_iter()
                    .chain(info.location.as_deref())
                    .collect();
                match self.resolve_location(&queries).await {
                    Ok(Some(coordinates)) => coordinates,
                    Ok(None) => {
                        return Ok(self.reject(author, SubmissionRejection::MissingGeolocation));
                    }
                    Err(rejection) => return Ok(self.reject(author, rejection)),
                }
            }
        };

        let classification = match timeout(self.collaborator_timeout(), self.classifier.classify(&text)).await {
            Ok(Ok(c)) if c.embedding.iter().any(|v| *v != 0.0) => c,
            Ok(Ok(_)) | Ok(Err(ClassifyError::TooGeneric)) => {
                return Ok(self.reject(author, SubmissionRejection::InsufficientNlpInfo));
            }
            Ok(Err(e)) => {
                let rejection = SubmissionRejection::ClassifierUnavailable { message: e.to_string() };
                return Ok(self.reject(author, rejection));
            }
            Err(_) => {
                let message = ClassifyError::Timeout.to_string();
                return Ok(self.reject(author, SubmissionRejection::ClassifierUnavailable { message }));
            }
        };

        let verdict = self
            .duplicates
            .search(self.candidates.as_ref(), &classification.embedding, coordinates)
            .await?;
        let related_to = match verdict {
            DuplicateVerdict::Duplicate { id, similarity } => {
                info!(author, existing = %id, similarity, "coordinator: duplicate submission");
                return Ok(SubmissionOutcome::Duplicate { existing: id, similarity });
            }
            DuplicateVerdict::Related { id, similarity } => Some(RelatedReport { id, similarity }),
            DuplicateVerdict::Unique => None,
        };

        let now = self.clock.now();
        let author_reputation = self.reputation.get_reputation(author);
        let credibility = self.credibility.calculate_credibility(author, 0, 0, false);
        let report = Report {
            id: ReportId::generate(),
            author: request.author.clone(),
            text,
            location_text: location_text.map(str::to_string),
            coordinates,
            embedding: classification.embedding,
            topic: classification.topic,
            urgency: classification.urgency,
            status: ReportStatus::PendingVerification,
            reliability_score: credibility.score,
            author_reputation_at_submit: author_reputation,
            observed_at: request.observed_at,
            created_at: now,
            updated_at: now,
            upvotes: 0,
            downvotes: 0,
            official_sources: Vec::new(),
        };
        self.reports
            .put_report(&report, Retention::ExpireAfter(self.lifecycle.unverified_ttl_secs))
            .await?;

        info!(
            author,
            id = %report.id,
            topic = report.topic.as_str(),
            urgency = report.urgency.as_str(),
            score = report.reliability_score,
            related = related_to.is_some(),
            "coordinator: report accepted"
        );
        Ok(SubmissionOutcome::Accepted { report, related_to })
    }

    fn reject(&self, author: &str, rejection: SubmissionRejection) -> SubmissionOutcome {
        warn!(author, code = rejection.code(), %rejection, "coordinator: submission rejected");
        SubmissionOutcome::Rejected(rejection)
    }

    fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.lifecycle.collaborator_timeout_secs)
    }

    /// Try each place description in order until one geocodes.
    async fn resolve_location(
        &self,
        queries: &[&str],
    ) -> Result<Option<Coordinates>, SubmissionRejection> {
        for query in queries {
            match timeout(self.collaborator_timeout(), self.geocoder.geocode(query)).await {
                Ok(Ok(Some(coordinates))) => return Ok(Some(coordinates)),
                Ok(Ok(None)) => debug!(query, "coordinator: place not found"),
                Ok(Err(e)) => {
                    return Err(SubmissionRejection::GeocoderUnavailable { message: e.to_string() });
                }
                Err(_) => {
                    return Err(SubmissionRejection::GeocoderUnavailable {
                        message: GeocodeError::Timeout.to_string(),
                    });
                }
            }
        }
        Ok(None)
    }

    // --- Voting ---

    /// Record `voter`'s vote on a report and apply any resulting transition.
    pub async fn cast_vote(
        &self,
        report_id: &ReportId,
        voter: &str,
        kind: VoteKind,
    ) -> Result<VoteOutcome, ReportError> {
        let _lock = self.lock_report(report_id).await;

        let mut report = self.load_mutable(report_id).await?;
        if report.author == voter {
            return Err(ReportError::InvalidOperation(
                "cannot vote on your own report".to_string(),
            ));
        }
        if self.lifecycle.enforce_penalties {
            let penalty = self.penalty_for(voter).await?;
            if !penalty.can_interact {
                return Err(ReportError::Suspended {
                    user: voter.to_string(),
                    reason: penalty.reason.unwrap_or_else(|| "active penalty".to_string()),
                });
            }
        }

        let previous = self.reports.get_vote(voter, report_id).await?;
        if previous == Some(kind) {
            debug!(report = %report_id, voter, %kind, "coordinator: repeated vote ignored");
            return Ok(VoteOutcome::Unchanged(report));
        }

        report.apply_vote(kind, previous);
        let transition = self.rescore(&mut report);
        let retention = retention_for(transition, self.lifecycle.unverified_ttl_secs);
        self.reports.commit_vote(&report, voter, kind, retention).await?;
        self.apply_feedback(&report, transition);

        debug!(
            report = %report_id,
            voter,
            %kind,
            upvotes = report.upvotes,
            downvotes = report.downvotes,
            score = report.reliability_score,
            "coordinator: vote recorded"
        );
        Ok(VoteOutcome::Recorded(ReportUpdate { report, transition }))
    }

    // --- Out-of-band verdicts ---

    /// Attach an authoritative confirmation; the report scores 1.0 from now on.
    pub async fn attach_official_source(
        &self,
        report_id: &ReportId,
        reference: &str,
    ) -> Result<ReportUpdate, ReportError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ReportError::InvalidOperation(
                "official source reference is empty".to_string(),
            ));
        }
        let _lock = self.lock_report(report_id).await;

        let mut report = self.load_mutable(report_id).await?;
        if !report.official_sources.iter().any(|s| s == reference) {
            report.official_sources.push(reference.to_string());
        }
        let transition = self.rescore(&mut report);
        let retention = retention_for(transition, self.lifecycle.unverified_ttl_secs);
        self.reports.put_report(&report, retention).await?;
        self.apply_feedback(&report, transition);

        info!(report = %report_id, reference, status = %report.status, "coordinator: official source attached");
        Ok(ReportUpdate { report, transition })
    }

    /// Confirm a report as a fake alarm: delete it, count it against the
    /// author, and feed an incorrect outcome into their reputation.
    pub async fn flag_fake_alarm(&self, report_id: &ReportId) -> Result<FakeAlarmOutcome, ReportError> {
        let _lock = self.lock_report(report_id).await;

        let mut report = self.load_mutable(report_id).await?;
        let transition = Transition {
            from: report.status,
            to: ReportStatus::Deleted,
            reputation_feedback: Some(false),
        };
        report.status = ReportStatus::Deleted;
        report.updated_at = self.clock.now();
        let fake_alarms = self.reports.commit_fake_alarm(&report).await?;
        self.apply_feedback(&report, Some(transition));

        let penalty = self.penalty_for(&report.author).await?;
        warn!(
            report = %report_id,
            author = report.author.as_str(),
            fake_alarms,
            "coordinator: fake alarm confirmed"
        );
        Ok(FakeAlarmOutcome {
            update: ReportUpdate {
                report,
                transition: Some(transition),
            },
            fake_alarms,
            penalty,
        })
    }

    /// Delete the report if its age and score call for removal.
    ///
    /// Returns `None` when the report stays (or is already deleted).
    pub async fn enforce_removal(&self, report_id: &ReportId) -> Result<Option<ReportUpdate>, ReportError> {
        let _lock = self.lock_report(report_id).await;

        let mut report = self
            .reports
            .get_report(report_id)
            .await?
            .ok_or_else(|| ReportError::NotFound(report_id.to_string()))?;
        if report.status.is_terminal() {
            return Ok(None);
        }
        let now = self.clock.now();
        let days = report.days_since_created(now);
        if !self.credibility.should_remove_report(
            report.reliability_score,
            days,
            report.is_verified_by_authority(),
        ) {
            return Ok(None);
        }

        let transition = Transition {
            from: report.status,
            to: ReportStatus::Deleted,
            reputation_feedback: None,
        };
        report.status = ReportStatus::Deleted;
        report.updated_at = now;
        self.reports.put_report(&report, Retention::Keep).await?;

        info!(report = %report_id, days, score = report.reliability_score, "coordinator: report removed");
        Ok(Some(ReportUpdate {
            report,
            transition: Some(transition),
        }))
    }

    /// Recompute a report's score against current reputation.
    ///
    /// An `unverified_low_score` report whose score has recovered to the low
    /// threshold returns to `pending_verification` without feedback; any
    /// other report goes through the regular transition rules.
    pub async fn reevaluate(&self, report_id: &ReportId) -> Result<ReportUpdate, ReportError> {
        let _lock = self.lock_report(report_id).await;

        let mut report = self.load_mutable(report_id).await?;
        let transition = if report.status == ReportStatus::UnverifiedLowScore {
            self.refresh_score(&mut report);
            let recovered = report.reliability_score >= self.credibility.config().low_remove_threshold;
            recovered.then(|| {
                report.status = ReportStatus::PendingVerification;
                Transition {
                    from: ReportStatus::UnverifiedLowScore,
                    to: ReportStatus::PendingVerification,
                    reputation_feedback: None,
                }
            })
        } else {
            self.rescore(&mut report)
        };
        let retention = retention_for(transition, self.lifecycle.unverified_ttl_secs);
        self.reports.put_report(&report, retention).await?;
        self.apply_feedback(&report, transition);

        debug!(report = %report_id, score = report.reliability_score, status = %report.status, "coordinator: reevaluated");
        Ok(ReportUpdate { report, transition })
    }

    /// Full credibility breakdown for a stored report.
    pub async fn credibility_of(&self, report_id: &ReportId) -> Result<CredibilityResult, ReportError> {
        let report = self
            .reports
            .get_report(report_id)
            .await?
            .ok_or_else(|| ReportError::NotFound(report_id.to_string()))?;
        Ok(self.credibility.calculate_credibility(
            &report.author,
            report.upvotes,
            report.downvotes,
            report.is_verified_by_authority(),
        ))
    }

    // --- Author standing ---

    /// Aggregate the counters that drive rewards and penalties.
    pub async fn user_activity(&self, user: &str) -> Result<UserActivity, StoreError> {
        let reports = self.reports.reports_by_author(user).await?;
        let high = self.rewards.config().high_credibility_threshold;
        let low = self.penalties.config().low_credibility_threshold;

        let mut activity = UserActivity {
            fake_alarms: self.reports.fake_alarm_count(user).await?,
            ..UserActivity::default()
        };
        for report in &reports {
            if report.reliability_score >= high {
                activity.high_credibility_posts = activity.high_credibility_posts.saturating_add(1);
            }
            if report.reliability_score < low {
                activity.low_credibility_posts = activity.low_credibility_posts.saturating_add(1);
            }
            activity.total_upvotes = activity.total_upvotes.saturating_add(u64::from(report.upvotes));
        }
        Ok(activity)
    }

    pub async fn penalty_for(&self, user: &str) -> Result<PenaltyDecision, StoreError> {
        let activity = self.user_activity(user).await?;
        Ok(self
            .penalties
            .check_penalty(user, activity.low_credibility_posts, activity.fake_alarms))
    }

    /// Reward decision for `user`, withheld while a penalty disables rewards.
    pub async fn reward_for(&self, user: &str) -> Result<RewardDecision, StoreError> {
        let activity = self.user_activity(user).await?;
        let penalty = self
            .penalties
            .check_penalty(user, activity.low_credibility_posts, activity.fake_alarms);
        if !penalty.reward_eligible {
            let reason = penalty.reason.unwrap_or_else(|| "active penalty".to_string());
            return Ok(RewardDecision::Withheld { reason });
        }
        Ok(self.rewards.calculate_reward(
            user,
            activity.high_credibility_posts,
            activity.total_upvotes,
        ))
    }

    // --- Internal helpers ---

    /// Take the per-report mutex. The map entry lives only while some caller
    /// holds or waits on it.
    async fn lock_report(&self, id: &ReportId) -> ReportLock<'_> {
        let mutex = self.report_locks.entry(id.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        ReportLock {
            locks: &self.report_locks,
            id: id.clone(),
            guard: Some(guard),
        }
    }

    /// Load a report that may still change; deleted reports are final.
    async fn load_mutable(&self, id: &ReportId) -> Result<Report, ReportError> {
        let report = self
            .reports
            .get_report(id)
            .await?
            .ok_or_else(|| ReportError::NotFound(id.to_string()))?;
        if report.status.is_terminal() {
            return Err(ReportError::InvalidOperation(format!("report {id} is deleted")));
        }
        Ok(report)
    }

    fn refresh_score(&self, report: &mut Report) {
        let result = self.credibility.calculate_credibility(
            &report.author,
            report.upvotes,
            report.downvotes,
            report.is_verified_by_authority(),
        );
        report.reliability_score = result.score;
        report.updated_at = self.clock.now();
    }

    /// Recompute the score and apply the first matching transition rule.
    fn rescore(&self, report: &mut Report) -> Option<Transition> {
        self.refresh_score(report);
        let c = self.credibility.config();
        let score = report.reliability_score;
        let from = report.status;

        let (to, feedback) = if score >= c.high_threshold && from == ReportStatus::PendingVerification {
            (ReportStatus::VerifiedCommunity, true)
        } else if score < c.medium_threshold && from == ReportStatus::VerifiedCommunity {
            (ReportStatus::PendingVerification, false)
        } else if score < c.low_remove_threshold
            && !matches!(from, ReportStatus::UnverifiedLowScore | ReportStatus::Deleted)
        {
            (ReportStatus::UnverifiedLowScore, false)
        } else {
            return None;
        };

        report.status = to;
        info!(report = %report.id, %from, %to, score, "coordinator: status transition");
        Some(Transition {
            from,
            to,
            reputation_feedback: Some(feedback),
        })
    }

    fn apply_feedback(&self, report: &Report, transition: Option<Transition>) {
        if let Some(correct) = transition.and_then(|t| t.reputation_feedback) {
            self.reputation.update_reputation(&report.author, correct);
        }
    }
}

/// Verified reports live until deleted; a report demoted back to pending
/// gets a fresh unverified TTL.
fn retention_for(transition: Option<Transition>, ttl_secs: u64) -> Retention {
    match transition.map(|t| (t.from, t.to)) {
        Some((_, ReportStatus::VerifiedCommunity)) => Retention::Persist,
        Some((ReportStatus::VerifiedCommunity, ReportStatus::PendingVerification)) => {
            Retention::ExpireAfter(ttl_secs)
        }
        _ => Retention::Keep,
    }
}
