//! Anomaly detection over aligned latency/memory windows
//!
//! This module provides:
//! - Exact-timestamp alignment of the two signal streams
//! - Isolation-forest scoring refitted on every window
//! - Timestamp-keyed duplicate suppression against the store

mod aligner;
mod dedup;
mod isolation_forest;
mod scorer;

pub use aligner::align;
pub use dedup::Deduplicator;
pub use isolation_forest::{ForestParams, IsolationForest, N_FEATURES};
pub use scorer::{AnomalyScorer, ScorerConfig, DEFAULT_CONTAMINATION, MIN_ROWS};
