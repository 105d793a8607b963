//! Node configuration for a Crowdwatch node.
//!
//! [`NodeConfig`] gathers every tunable of the node: where data lives, which
//! storage backend to use, logging, report lifecycle timings, the trust
//! pipeline, and the built-in collaborators. [`NodeConfig::load`] layers an
//! optional file and `CROWDWATCH__*` environment variables over the
//! defaults, then validates the result.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crowdwatch_core::error::ConfigError;
use crowdwatch_trust::config::TrustConfig;

use crate::collaborators::{default_places, ClassifierConfig, PlaceEntry};
use crate::coordinator::LifecycleConfig;

/// Environment variable prefix. Nested keys are separated by `__`, so
/// `CROWDWATCH__TRUST__RATE_LIMIT__MAX_PER_WINDOW=10` sets
/// `trust.rate_limit.max_per_window`.
pub const ENV_PREFIX: &str = "CROWDWATCH";

/// Where reports, votes, and counters are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local; everything is lost on exit.
    Memory,
    #[default]
    Rocksdb,
}

/// Configuration for a node instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    pub storage: StorageBackend,
    /// Log level filter string (e.g. "info", "debug", "crowdwatch_node_lib=trace").
    pub log_level: String,
    /// "text" or "json".
    pub log_format: String,
    pub lifecycle: LifecycleConfig,
    pub trust: TrustConfig,
    pub gazetteer: Vec<PlaceEntry>,
    pub classifier: ClassifierConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("crowdwatch");

        Self {
            data_dir,
            storage: StorageBackend::default(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            lifecycle: LifecycleConfig::default(),
            trust: TrustConfig::default(),
            gazetteer: default_places(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load defaults, then `path` (format chosen by extension) if given,
    /// then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(ConfigError::InvalidValue {
                field: "log_format",
                message: format!("{:?} is not \"text\" or \"json\"", self.log_format),
            });
        }
        self.lifecycle.validate()?;
        self.trust.validate()?;
        self.classifier.validate()?;
        Ok(())
    }

    /// Path to the RocksDB report database.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("reports")
    }
}
