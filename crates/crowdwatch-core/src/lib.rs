//! # crowdwatch-core
//! Domain types, storage contracts, and defaults for the Crowdwatch trust pipeline.

pub mod constants;
pub mod error;
pub mod memory;
pub mod time;
pub mod traits;
pub mod types;
