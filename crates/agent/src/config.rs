//! Agent configuration

use anomaly_lib::anomaly::DEFAULT_CONTAMINATION;
use anomaly_lib::source::{DEFAULT_LATENCY_QUERY, DEFAULT_MEMORY_QUERY};
use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// API server port for the anomaly listing, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Prometheus base URL
    #[serde(default = "default_source_url")]
    pub source_url: String,

    /// Anomaly store connection string (`sqlite://...` or `memory://`)
    #[serde(default = "default_store_url")]
    pub store_url: String,

    /// Trailing window scored each cycle, in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Pause between detection cycles, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Expected outlier fraction, in (0, 0.5]
    #[serde(default = "default_contamination")]
    pub contamination: f64,

    /// Query for the latency signal
    #[serde(default = "default_latency_query")]
    pub latency_query: String,

    /// Query for the memory signal
    #[serde(default = "default_memory_query")]
    pub memory_query: String,

    /// Range query resolution, in seconds
    #[serde(default = "default_query_step_secs")]
    pub query_step_secs: u64,

    /// Per-request timeout against the metric source, in seconds
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,

    /// Seed for the isolation forest
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_api_port() -> u16 {
    5000
}

fn default_source_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_store_url() -> String {
    "sqlite://anomalies.db".to_string()
}

fn default_window_secs() -> u64 {
    600
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_contamination() -> f64 {
    DEFAULT_CONTAMINATION
}

fn default_latency_query() -> String {
    DEFAULT_LATENCY_QUERY.to_string()
}

fn default_memory_query() -> String {
    DEFAULT_MEMORY_QUERY.to_string()
}

fn default_query_step_secs() -> u64 {
    15
}

fn default_source_timeout_secs() -> u64 {
    10
}

fn default_seed() -> u64 {
    42
}

impl AgentConfig {
    /// Load configuration from an optional `anomaly-agent` config file and
    /// `ANOMALY_*` environment variables (environment wins)
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("anomaly-agent").required(false))
            .add_source(config::Environment::with_prefix("ANOMALY").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        let config: AgentConfig = config
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;

        Ok(config)
    }

    /// Reject values the detector cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(self.window_secs > 0, "window_secs must be greater than zero");
        ensure!(
            self.poll_interval_secs > 0,
            "poll_interval_secs must be greater than zero"
        );
        ensure!(
            self.query_step_secs > 0,
            "query_step_secs must be greater than zero"
        );
        ensure!(
            self.source_timeout_secs > 0,
            "source_timeout_secs must be greater than zero"
        );
        ensure!(
            self.contamination > 0.0 && self.contamination <= 0.5,
            "contamination must be in (0, 0.5], got {}",
            self.contamination
        );
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn query_step(&self) -> Duration {
        Duration::from_secs(self.query_step_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }
}
