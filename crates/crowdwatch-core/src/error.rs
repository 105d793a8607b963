//! Error types for the Crowdwatch pipeline.
//!
//! Content admissibility failures are *not* errors; they are returned as
//! values by the filter and the coordinator. Everything here is either a
//! collaborator failure or caller misuse.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend: {0}")] Backend(String),
    #[error("codec: {0}")] Codec(String),
    #[error("record missing or expired: {0}")] Missing(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeocodeError {
    #[error("geocoder unavailable: {0}")] Unavailable(String),
    #[error("geocoder timed out")] Timeout,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("content too generic to embed")] TooGeneric,
    #[error("classifier unavailable: {0}")] Unavailable(String),
    #[error("classifier timed out")] Timeout,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("report not found: {0}")] NotFound(String),
    #[error("invalid operation: {0}")] InvalidOperation(String),
    #[error("user {user} is suspended: {reason}")] Suspended { user: String, reason: String },
    #[error(transparent)] Store(StoreError),
}

impl From<StoreError> for ReportError {
    /// A record that vanished under a write is reported like any unknown report.
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Missing(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid pattern {pattern:?}: {message}")] InvalidPattern { pattern: String, message: String },
    #[error("invalid value for {field}: {message}")] InvalidValue { field: &'static str, message: String },
    #[error("load: {0}")] Load(String),
}

#[derive(Error, Debug)]
pub enum CrowdwatchError {
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Geocode(#[from] GeocodeError),
    #[error(transparent)] Classify(#[from] ClassifyError),
    #[error(transparent)] Report(#[from] ReportError),
    #[error(transparent)] Config(#[from] ConfigError),
}
