//! Metric sources
//!
//! A metric source answers range queries for a named signal and returns
//! timestamped samples. The detector only depends on the trait; the
//! Prometheus implementation is the one wired in by the agent binary.

mod prom;

pub use prom::{PrometheusSource, PrometheusSourceConfig};

use crate::error::Result;
use crate::models::Sample;
use chrono::{DateTime, Utc};

pub use async_trait::async_trait;

/// Default query for the p99 request latency signal
pub const DEFAULT_LATENCY_QUERY: &str =
    "histogram_quantile(0.99, sum by (le) (rate(http_request_duration_seconds_bucket[1m])))";

/// Default query for the memory usage signal
pub const DEFAULT_MEMORY_QUERY: &str = "node_memory_usage_bytes";

/// Trait for time-series query implementations
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Fetch samples for `signal` over `[start, end)`
    ///
    /// Returns an empty vector when the range holds no data; transport and
    /// query failures surface as `DetectorError::SourceUnavailable`.
    async fn range_query(
        &self,
        signal: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sample>>;
}
