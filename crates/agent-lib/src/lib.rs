//! Agent library for latency/memory anomaly detection
//!
//! This crate provides the core functionality for:
//! - Querying latency and memory series from a metric source
//! - Aligning, scoring and deduplicating anomalies per window
//! - Persisting anomalies and serving the most recent ones over HTTP
//! - Health checks and observability

pub mod anomaly;
pub mod api;
pub mod detector;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod source;
pub mod store;

pub use error::{DetectorError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{DetectorMetrics, StructuredLogger};
