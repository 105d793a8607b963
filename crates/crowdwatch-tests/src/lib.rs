//! Adversarial and end-to-end test suite for Crowdwatch.
//!
//! This crate contains integration tests that drive the whole trust
//! pipeline through the lifecycle coordinator, over both the in-memory and
//! the RocksDB store, and property tests that try to push scores, penalties,
//! and vote bookkeeping outside their invariants.

pub mod helpers;
