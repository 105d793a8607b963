//! Near-duplicate detection over nearby reports.
//!
//! Candidates are first restricted to a square of `±geo_tolerance_deg`
//! around the new report (strict bounds), then ranked by cosine similarity
//! of their embeddings. The best match is classified against two cut
//! points:
//!
//! - `similarity >= duplicate_threshold`: same event, the submission is dropped
//! - `similarity >= reference_threshold`: related event, both are kept
//! - otherwise: unrelated

use crowdwatch_core::constants::{
    COSINE_SIMILARITY_THRESHOLD_DUPLICATE, COSINE_SIMILARITY_THRESHOLD_REFERENCE,
    GEO_TOLERANCE_DEG,
};
use crowdwatch_core::error::{ConfigError, StoreError};
use crowdwatch_core::traits::CandidateRepository;
use crowdwatch_core::types::{Coordinates, DuplicateCandidate, ReportId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tunables for [`DuplicateDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    pub duplicate_threshold: f64,
    pub reference_threshold: f64,
    pub geo_tolerance_deg: f64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: COSINE_SIMILARITY_THRESHOLD_DUPLICATE,
            reference_threshold: COSINE_SIMILARITY_THRESHOLD_REFERENCE,
            geo_tolerance_deg: GEO_TOLERANCE_DEG,
        }
    }
}

impl DuplicateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reference_threshold > self.duplicate_threshold {
            return Err(ConfigError::InvalidValue {
                field: "duplicate.reference_threshold",
                message: "must not exceed duplicate_threshold".into(),
            });
        }
        if !(self.geo_tolerance_deg > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "duplicate.geo_tolerance_deg",
                message: format!("{} must be positive", self.geo_tolerance_deg),
            });
        }
        Ok(())
    }
}

/// Classification of a new report against existing ones.
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateVerdict {
    Unique,
    Related { id: ReportId, similarity: f64 },
    Duplicate { id: ReportId, similarity: f64 },
}

impl DuplicateVerdict {
    /// The matched report, if any.
    pub fn matched(&self) -> Option<(&ReportId, f64)> {
        match self {
            Self::Unique => None,
            Self::Related { id, similarity } | Self::Duplicate { id, similarity } => {
                Some((id, *similarity))
            }
        }
    }
}

/// Cosine similarity of two embeddings.
///
/// Returns 0 for mismatched dimensions, empty vectors, or a zero-norm side.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

pub struct DuplicateDetector {
    config: DuplicateConfig,
}

impl DuplicateDetector {
    pub fn new(config: DuplicateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DuplicateConfig {
        &self.config
    }

    /// Classify `embedding` at `location` against `candidates`.
    ///
    /// Ties keep the first candidate seen.
    pub fn find_duplicate(
        &self,
        embedding: &[f32],
        location: Coordinates,
        candidates: &[DuplicateCandidate],
    ) -> DuplicateVerdict {
        let tolerance = self.config.geo_tolerance_deg;
        let mut best: Option<&ReportId> = None;
        let mut best_similarity = 0.0;

        for candidate in candidates
            .iter()
            .filter(|c| location.within_box(&c.coordinates, tolerance))
        {
            let similarity = cosine_similarity(embedding, &candidate.embedding);
            if similarity > best_similarity {
                best_similarity = similarity;
                best = Some(&candidate.id);
            }
        }

        let Some(id) = best else {
            return DuplicateVerdict::Unique;
        };
        let verdict = if best_similarity >= self.config.duplicate_threshold {
            DuplicateVerdict::Duplicate { id: id.clone(), similarity: best_similarity }
        } else if best_similarity >= self.config.reference_threshold {
            DuplicateVerdict::Related { id: id.clone(), similarity: best_similarity }
        } else {
            DuplicateVerdict::Unique
        };
        debug!(best = %id, similarity = best_similarity, ?verdict, "duplicate: best match");
        verdict
    }

    /// Fetch nearby candidates from `repository` and classify against them.
    pub async fn search(
        &self,
        repository: &dyn CandidateRepository,
        embedding: &[f32],
        location: Coordinates,
    ) -> Result<DuplicateVerdict, StoreError> {
        let candidates = repository
            .candidates_near(location, self.config.geo_tolerance_deg)
            .await?;
        Ok(self.find_duplicate(embedding, location, &candidates))
    }
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(DuplicateConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdwatch_core::memory::MemoryStore;
    use crowdwatch_core::traits::{ReportStore, Retention};
    use crowdwatch_core::types::{Report, ReportStatus};

    const HERE: Coordinates = Coordinates { latitude: 21.0167, longitude: 105.8163 };

    /// Unit vector at cosine `s` from `[1, 0]`.
    fn at_similarity(s: f32) -> Vec<f32> {
        vec![s, (1.0 - s * s).sqrt()]
    }

    fn candidate(id: &str, coordinates: Coordinates, embedding: Vec<f32>) -> DuplicateCandidate {
        DuplicateCandidate { id: ReportId::from(id), coordinates, embedding }
    }

    #[test]
    fn cosine_edge_cases() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn high_similarity_nearby_is_duplicate() {
        let c = [candidate("old", HERE, at_similarity(0.90))];
        let v = DuplicateDetector::default().find_duplicate(&[1.0, 0.0], HERE, &c);
        assert!(matches!(v, DuplicateVerdict::Duplicate { ref id, .. } if id.as_str() == "old"));
    }

    #[test]
    fn medium_similarity_is_related() {
        let c = [candidate("old", HERE, at_similarity(0.75))];
        let v = DuplicateDetector::default().find_duplicate(&[1.0, 0.0], HERE, &c);
        assert!(matches!(v, DuplicateVerdict::Related { .. }));
    }

    #[test]
    fn low_similarity_is_unique() {
        let c = [candidate("old", HERE, at_similarity(0.50))];
        let v = DuplicateDetector::default().find_duplicate(&[1.0, 0.0], HERE, &c);
        assert_eq!(v, DuplicateVerdict::Unique);
    }

    #[test]
    fn distant_candidates_are_ignored() {
        let far = Coordinates::new(HERE.latitude + 0.05, HERE.longitude);
        let c = [candidate("far", far, vec![1.0, 0.0])];
        let v = DuplicateDetector::default().find_duplicate(&[1.0, 0.0], HERE, &c);
        assert_eq!(v, DuplicateVerdict::Unique);
    }

    #[test]
    fn best_candidate_wins_and_ties_keep_first() {
        let c = [
            candidate("weak", HERE, at_similarity(0.75)),
            candidate("first", HERE, vec![1.0, 0.0]),
            candidate("second", HERE, vec![2.0, 0.0]),
        ];
        let v = DuplicateDetector::default().find_duplicate(&[1.0, 0.0], HERE, &c);
        assert_eq!(v.matched().map(|(id, _)| id.as_str()), Some("first"));
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let config = DuplicateConfig {
            reference_threshold: 0.9,
            duplicate_threshold: 0.8,
            ..DuplicateConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn search_reads_from_repository() {
        let store = MemoryStore::new();
        let report = Report {
            id: ReportId::from("stored"),
            author: "alice".into(),
            text: "Cháy nhà ở quận Đống Đa hôm nay".into(),
            location_text: None,
            coordinates: HERE,
            embedding: vec![1.0, 0.0],
            topic: "chay_no".into(),
            urgency: "nguy_hiem".into(),
            status: ReportStatus::PendingVerification,
            reliability_score: 0.3,
            author_reputation_at_submit: 0.5,
            observed_at: None,
            created_at: 0,
            updated_at: 0,
            upvotes: 0,
            downvotes: 0,
            official_sources: vec![],
        };
        store.put_report(&report, Retention::Persist).await.unwrap();
        let v = DuplicateDetector::default()
            .search(&store, &[1.0, 0.0], HERE)
            .await
            .unwrap();
        assert!(matches!(v, DuplicateVerdict::Duplicate { .. }));
    }
}
