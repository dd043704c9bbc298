//! Staged harvester for school admission scores.
//!
//! School list → per-school info → per-school dictionary flattened into join
//! tuples → grouping → paginated detail per group.

pub mod api;
pub mod collector;
pub mod combination;
pub mod config;
pub mod error;
pub mod grouping;
pub mod models;
pub mod orchestrator;
pub mod pagination;
pub mod pool;
pub mod stages;

pub use config::{DedupPolicy, GroupSplit, HarvestConfig};
pub use error::{HarvestError, Result};
pub use orchestrator::{HarvestSummary, Harvester};
