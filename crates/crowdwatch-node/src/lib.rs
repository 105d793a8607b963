//! # crowdwatch-node-lib: Report lifecycle, RocksDB storage, wiring.
//!
//! Composes the trust pipeline into a running node:
//! - [`coordinator::ReportLifecycleCoordinator`]: submission, voting, and status transitions
//! - [`storage::RocksStore`]: persistent reports, votes, and counters backed by RocksDB
//! - [`collaborators`]: built-in gazetteer geocoder and lexicon classifier
//! - [`config::NodeConfig`]: layered node configuration
//! - [`node::Node`]: a coordinator wired over the configured store

pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod node;
pub mod storage;

pub use collaborators::{GazetteerGeocoder, LexiconClassifier};
pub use config::{NodeConfig, StorageBackend};
pub use coordinator::{
    ReportLifecycleCoordinator, SubmissionOutcome, SubmissionRejection, SubmissionRequest,
    VoteOutcome,
};
pub use node::{Node, NodeStore};
pub use storage::RocksStore;
