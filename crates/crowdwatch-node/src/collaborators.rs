//! Self-contained geocoding and classification collaborators.
//!
//! These stand in for the external place-lookup service and the trained
//! text model so that a node can run end to end without either:
//!
//! - [`GazetteerGeocoder`] resolves place names from a configured list
//! - [`LexiconClassifier`] hashes tokens into a fixed-dimension embedding
//!   with BLAKE3 and labels topic and urgency from keyword lexicons
//!
//! Both are deterministic, which the duplicate detector relies on: the
//! same text always yields the same embedding.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crowdwatch_core::error::{ClassifyError, ConfigError, GeocodeError};
use crowdwatch_core::traits::{Classifier, Geocoder};
use crowdwatch_core::types::{Classification, Coordinates};

// ---------------------------------------------------------------------------
// Gazetteer
// ---------------------------------------------------------------------------

/// A named place with its coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceEntry {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl PlaceEntry {
    fn new(name: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.to_string(),
            latitude,
            longitude,
        }
    }
}

/// Places known out of the box.
pub fn default_places() -> Vec<PlaceEntry> {
    vec![
        PlaceEntry::new("Láng Hạ", 21.0167, 105.8163),
        PlaceEntry::new("Mỹ Đình", 21.0177, 105.7766),
        PlaceEntry::new("Đống Đa", 21.005, 105.815),
        PlaceEntry::new("cầu Chương Dương", 21.033, 105.877),
        PlaceEntry::new("công viên Thống Nhất", 21.008, 105.842),
    ]
}

/// Geocoder over a fixed list of places.
///
/// A query matches the first entry whose name appears in it, ignoring case.
pub struct GazetteerGeocoder {
    places: Vec<(String, Coordinates)>,
}

impl GazetteerGeocoder {
    pub fn new(places: Vec<PlaceEntry>) -> Self {
        Self {
            places: places
                .into_iter()
                .map(|p| (p.name.to_lowercase(), Coordinates::new(p.latitude, p.longitude)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}

impl Default for GazetteerGeocoder {
    fn default() -> Self {
        Self::new(default_places())
    }
}

#[async_trait]
impl Geocoder for GazetteerGeocoder {
    async fn geocode(&self, location: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let query = location.trim().to_lowercase();
        if query.is_empty() {
            return Ok(None);
        }
        let hit = self
            .places
            .iter()
            .find(|(name, _)| query.contains(name.as_str()))
            .map(|(_, coords)| *coords);
        debug!(location, found = hit.is_some(), "geocoder: lookup");
        Ok(hit)
    }
}

// ---------------------------------------------------------------------------
// Lexicon classifier
// ---------------------------------------------------------------------------

/// Keywords that mark a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicLexicon {
    pub topic: String,
    pub keywords: Vec<String>,
}

fn lexicon(topic: &str, keywords: &[&str]) -> TopicLexicon {
    TopicLexicon {
        topic: topic.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

/// Tunables for [`LexiconClassifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub dimensions: usize,
    /// Tokens shorter than this (in characters) are ignored.
    pub min_token_chars: usize,
    pub topics: Vec<TopicLexicon>,
    /// Topic when no lexicon matches.
    pub fallback_topic: String,
    pub urgent_keywords: Vec<String>,
    pub urgent_label: String,
    pub normal_label: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            dimensions: 64,
            min_token_chars: 2,
            topics: vec![
                lexicon("giao_thong", &["tai nạn", "va chạm", "kẹt xe", "tắc đường", "ùn tắc", "xe máy", "ô tô"]),
                lexicon("chay_no", &["cháy", "nổ", "khói", "lửa"]),
                lexicon("toi_pham", &["cướp", "trộm", "móc túi", "đánh nhau", "giật"]),
                lexicon("ngap_lut", &["ngập", "lụt", "mưa lớn", "nước dâng"]),
            ],
            fallback_topic: "khac".to_string(),
            urgent_keywords: ["cháy", "nổ", "cướp", "bị thương", "nguy hiểm", "khẩn cấp", "ngập sâu"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            urgent_label: "nguy_hiem".to_string(),
            normal_label: "trung_binh".to_string(),
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimensions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "classifier.dimensions",
                message: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Deterministic keyword classifier with hashed bag-of-words embeddings.
pub struct LexiconClassifier {
    config: ClassifierConfig,
}

impl LexiconClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    fn tokens<'a>(&self, lower: &'a str) -> Vec<&'a str> {
        lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= self.config.min_token_chars)
            .collect()
    }

    /// L2-normalized signed feature hash of `tokens`.
    fn embed(&self, tokens: &[&str]) -> Vec<f32> {
        let dims = self.config.dimensions;
        let mut vector = vec![0.0f32; dims];
        for token in tokens {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut index_bytes = [0u8; 8];
            index_bytes.copy_from_slice(&bytes[..8]);
            let index = (u64::from_le_bytes(index_bytes) % dims as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn topic(&self, lower: &str) -> String {
        let mut best: Option<(&str, usize)> = None;
        for entry in &self.config.topics {
            let hits = entry
                .keywords
                .iter()
                .filter(|k| lower.contains(k.to_lowercase().as_str()))
                .count();
            if hits > 0 && best.is_none_or(|(_, n)| hits > n) {
                best = Some((entry.topic.as_str(), hits));
            }
        }
        best.map_or_else(|| self.config.fallback_topic.clone(), |(t, _)| t.to_string())
    }

    fn urgency(&self, lower: &str) -> String {
        let urgent = self
            .config
            .urgent_keywords
            .iter()
            .any(|k| lower.contains(k.to_lowercase().as_str()));
        if urgent {
            self.config.urgent_label.clone()
        } else {
            self.config.normal_label.clone()
        }
    }
}

impl Default for LexiconClassifier {
    fn default() -> Self {
        Self {
            config: ClassifierConfig::default(),
        }
    }
}

#[async_trait]
impl Classifier for LexiconClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifyError> {
        let lower = text.to_lowercase();
        let tokens = self.tokens(&lower);
        if tokens.is_empty() {
            return Err(ClassifyError::TooGeneric);
        }
        let embedding = self.embed(&tokens);
        if embedding.iter().all(|v| *v == 0.0) {
            return Err(ClassifyError::TooGeneric);
        }
        let classification = Classification {
            embedding,
            topic: self.topic(&lower),
            urgency: self.urgency(&lower),
        };
        debug!(
            tokens = tokens.len(),
            topic = classification.topic.as_str(),
            urgency = classification.urgency.as_str(),
            "classifier: labelled"
        );
        Ok(classification)
    }
}
