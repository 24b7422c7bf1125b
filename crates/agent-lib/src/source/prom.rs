//! Prometheus range-query client
//!
//! Talks to the `/api/v1/query_range` endpoint of a Prometheus-compatible
//! server. Every failure mode (transport, non-2xx, error status, undecodable
//! body) maps to `DetectorError::SourceUnavailable`.

use super::{async_trait, MetricSource};
use crate::error::{DetectorError, Result};
use crate::models::Sample;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Configuration for the Prometheus client
#[derive(Debug, Clone)]
pub struct PrometheusSourceConfig {
    /// Base URL of the Prometheus server (e.g., "http://localhost:9090")
    pub base_url: String,
    /// Resolution step for range queries
    pub step: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for PrometheusSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090".to_string(),
            step: Duration::from_secs(15),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Metric source backed by the Prometheus HTTP API
pub struct PrometheusSource {
    client: Client,
    query_url: Url,
    step: Duration,
}

impl PrometheusSource {
    /// Create a new client
    pub fn new(config: PrometheusSourceConfig) -> Result<Self> {
        if config.step.is_zero() {
            return Err(DetectorError::invalid_config("query_step", "must be non-zero"));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DetectorError::invalid_config("source_url", e.to_string()))?;

        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| DetectorError::invalid_config("source_url", e.to_string()))?;
        // Keep a path prefix (e.g. behind a reverse proxy) when joining
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let query_url = base_url
            .join("api/v1/query_range")
            .map_err(|e| DetectorError::invalid_config("source_url", e.to_string()))?;

        Ok(Self {
            client,
            query_url,
            step: config.step,
        })
    }

    /// Create a client with default step and timeout
    pub fn with_defaults(base_url: impl Into<String>) -> Result<Self> {
        Self::new(PrometheusSourceConfig {
            base_url: base_url.into(),
            ..Default::default()
        })
    }

    /// URL used for range queries
    pub fn query_url(&self) -> &Url {
        &self.query_url
    }
}

#[async_trait]
impl MetricSource for PrometheusSource {
    async fn range_query(
        &self,
        signal: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sample>> {
        let params = [
            ("query", signal.to_string()),
            ("start", format_unix_secs(start)),
            ("end", format_unix_secs(end)),
            ("step", format!("{}s", self.step.as_secs_f64())),
        ];

        let response = self
            .client
            .get(self.query_url.clone())
            .query(&params)
            .send()
            .await
            .map_err(|e| DetectorError::SourceUnavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::SourceUnavailable(format!(
                "query returned {}: {}",
                status, body
            )));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| DetectorError::SourceUnavailable(format!("malformed response: {}", e)))?;

        body.into_samples(signal, end)
    }
}

/// Envelope of a Prometheus API response
#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: Vec<Series>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    values: Vec<(f64, String)>,
}

impl QueryResponse {
    /// Samples of the first series, restricted to `[.., end)`
    ///
    /// Prometheus evaluates `query_range` at `end` inclusively.
    fn into_samples(self, signal: &str, end: DateTime<Utc>) -> Result<Vec<Sample>> {
        if self.status != "success" {
            return Err(DetectorError::SourceUnavailable(format!(
                "query failed: {}",
                self.error.unwrap_or_else(|| self.status.clone())
            )));
        }

        let data = self
            .data
            .ok_or_else(|| DetectorError::SourceUnavailable("response has no data".into()))?;

        if data.result_type != "matrix" {
            return Err(DetectorError::SourceUnavailable(format!(
                "unexpected result type '{}'",
                data.result_type
            )));
        }

        // Only the first matching series is used
        let Some(series) = data.result.into_iter().next() else {
            return Ok(Vec::new());
        };

        let mut samples = Vec::with_capacity(series.values.len());
        let mut dropped = 0usize;

        for (ts, raw) in series.values {
            let value: f64 = raw.parse().map_err(|_| {
                DetectorError::SourceUnavailable(format!("malformed sample value '{}'", raw))
            })?;
            if !value.is_finite() {
                dropped += 1;
                continue;
            }

            let timestamp = DateTime::from_timestamp_millis((ts * 1000.0).round() as i64)
                .ok_or_else(|| {
                    DetectorError::SourceUnavailable(format!("timestamp out of range: {}", ts))
                })?;
            if timestamp >= end {
                continue;
            }
            samples.push(Sample::new(timestamp, value));
        }

        if dropped > 0 {
            debug!(signal = %signal, dropped, "Dropped non-finite samples");
        }

        Ok(samples)
    }
}

/// Format an instant as fractional Unix seconds
fn format_unix_secs(ts: DateTime<Utc>) -> String {
    format!("{:.3}", ts.timestamp_millis() as f64 / 1000.0)
}
