//! Observability infrastructure for the anomaly agent
//!
//! Provides:
//! - Prometheus metrics (cycle latency and outcomes, anomalies, store and source errors)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for detection cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<DetectorMetricsInner> = OnceLock::new();

struct DetectorMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles_total: IntCounterVec,
    window_rows: IntGauge,
    anomalies_recorded: IntCounter,
    duplicates_suppressed: IntCounter,
    store_errors: IntCounter,
    source_errors: IntCounter,
}

impl DetectorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "anomaly_agent_cycle_duration_seconds",
                "Time spent in one detection cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles_total: register_int_counter_vec!(
                "anomaly_agent_cycles_total",
                "Detection cycles by outcome",
                &["outcome"]
            )
            .expect("Failed to register cycles_total"),

            window_rows: register_int_gauge!(
                "anomaly_agent_window_rows",
                "Aligned rows in the most recent window"
            )
            .expect("Failed to register window_rows"),

            anomalies_recorded: register_int_counter!(
                "anomaly_agent_anomalies_recorded_total",
                "Anomalies written to the store"
            )
            .expect("Failed to register anomalies_recorded"),

            duplicates_suppressed: register_int_counter!(
                "anomaly_agent_duplicates_suppressed_total",
                "Anomalies dropped because a record already existed at the timestamp"
            )
            .expect("Failed to register duplicates_suppressed"),

            store_errors: register_int_counter!(
                "anomaly_agent_store_errors_total",
                "Failed reads or writes against the anomaly store"
            )
            .expect("Failed to register store_errors"),

            source_errors: register_int_counter!(
                "anomaly_agent_source_errors_total",
                "Failed queries against the metric source"
            )
            .expect("Failed to register source_errors"),
        }
    }
}

/// Detector metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct DetectorMetrics {
    _private: (),
}

impl Default for DetectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DetectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DetectorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
    }

    /// Count a finished cycle under `outcome` (e.g. "completed", "no_data")
    pub fn inc_cycle(&self, outcome: &str) {
        self.inner()
            .cycles_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn set_window_rows(&self, rows: usize) {
        self.inner().window_rows.set(rows as i64);
    }

    pub fn inc_anomalies_recorded(&self) {
        self.inner().anomalies_recorded.inc();
    }

    pub fn inc_duplicates_suppressed(&self) {
        self.inner().duplicates_suppressed.inc();
    }

    pub fn inc_store_errors(&self) {
        self.inner().store_errors.inc();
    }

    pub fn inc_source_errors(&self) {
        self.inner().source_errors.inc();
    }
}

/// Structured logger for detector events
///
/// Emits event-tagged records for anomalies, skipped cycles and the agent
/// lifecycle.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log a newly recorded anomaly
    pub fn log_anomaly(
        &self,
        id: &str,
        timestamp: &str,
        latency: f64,
        memory: f64,
        detector_kind: &str,
    ) {
        warn!(
            event = "anomaly_detected",
            service = %self.service,
            id = %id,
            timestamp = %timestamp,
            latency = latency,
            memory = memory,
            detector_kind = %detector_kind,
            "Anomaly detected"
        );
    }

    /// Log a cycle that detected nothing because it was skipped
    pub fn log_cycle_skipped(&self, reason: &str, details: &str) {
        info!(
            event = "cycle_skipped",
            service = %self.service,
            reason = %reason,
            details = %details,
            "Detection cycle skipped"
        );
    }

    /// Log a completed cycle
    pub fn log_cycle_completed(
        &self,
        rows: usize,
        anomalies: usize,
        recorded: usize,
        duplicates: usize,
        failed: usize,
    ) {
        info!(
            event = "cycle_completed",
            service = %self.service,
            rows = rows,
            anomalies = anomalies,
            recorded = recorded,
            duplicates = duplicates,
            failed = failed,
            "Detection cycle complete"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, store_url: &str, source_url: &str) {
        info!(
            event = "agent_started",
            service = %self.service,
            agent_version = %version,
            store_url = %store_url,
            source_url = %source_url,
            "Anomaly agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            service = %self.service,
            reason = %reason,
            "Anomaly agent shutting down"
        );
    }
}
