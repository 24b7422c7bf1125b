//! CLI command implementations

pub mod anomalies;
pub mod health;
