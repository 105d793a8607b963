//! Node composition.
//!
//! The [`Node`] wires the configured store, the built-in collaborators, and
//! the trust pipeline into a [`ReportLifecycleCoordinator`], and keeps a
//! handle on the store for maintenance the coordinator does not own.

use std::sync::Arc;

use tracing::{debug, info};

use crowdwatch_core::error::{CrowdwatchError, StoreError};
use crowdwatch_core::memory::MemoryStore;
use crowdwatch_core::time::Clock;

use crate::collaborators::{GazetteerGeocoder, LexiconClassifier};
use crate::config::{NodeConfig, StorageBackend};
use crate::coordinator::ReportLifecycleCoordinator;
use crate::storage::RocksStore;

/// The store behind a node's coordinator.
pub enum NodeStore {
    Memory(Arc<MemoryStore>),
    Rocks(Arc<RocksStore>),
}

impl NodeStore {
    /// Physically remove expired records, returning how many were dropped.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        match self {
            Self::Memory(store) => Ok(store.purge_expired()),
            Self::Rocks(store) => store.purge_expired(),
        }
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        match self {
            Self::Memory(_) => Ok(()),
            Self::Rocks(store) => store.flush(),
        }
    }
}

/// A coordinator together with the store it writes to.
pub struct Node {
    pub coordinator: ReportLifecycleCoordinator,
    pub store: NodeStore,
}

impl Node {
    /// Open the configured store and build the coordinator over it.
    ///
    /// The RocksDB backend expects `config.data_dir` to exist.
    pub fn open(config: &NodeConfig, clock: Arc<dyn Clock>) -> Result<Self, CrowdwatchError> {
        config.validate()?;
        let geocoder = Arc::new(GazetteerGeocoder::new(config.gazetteer.clone()));
        let classifier = Arc::new(LexiconClassifier::new(config.classifier.clone())?);

        let (coordinator, store) = match config.storage {
            StorageBackend::Memory => {
                let store = Arc::new(MemoryStore::with_clock(clock.clone()));
                let coordinator = ReportLifecycleCoordinator::new(
                    store.clone(),
                    geocoder,
                    classifier,
                    clock,
                    config.trust.clone(),
                    config.lifecycle.clone(),
                )?;
                (coordinator, NodeStore::Memory(store))
            }
            StorageBackend::Rocksdb => {
                let store = Arc::new(RocksStore::open_with_clock(config.db_path(), clock.clone())?);
                let coordinator = ReportLifecycleCoordinator::new(
                    store.clone(),
                    geocoder,
                    classifier,
                    clock,
                    config.trust.clone(),
                    config.lifecycle.clone(),
                )?;
                (coordinator, NodeStore::Rocks(store))
            }
        };

        info!(storage = ?config.storage, "node: opened");
        Ok(Self { coordinator, store })
    }

    /// Purge expired records and flush to disk.
    pub fn close(&self) -> Result<usize, CrowdwatchError> {
        let purged = self.store.purge_expired()?;
        self.store.flush()?;
        debug!(purged, "node: closed");
        Ok(purged)
    }
}
