//! Detection loop
//!
//! Idle -> running a cycle -> idle, until the cancellation token fires.
//! Cancellation is checked before every cycle and during the sleep between
//! cycles.

use crate::anomaly::{align, AnomalyScorer, Deduplicator, ScorerConfig, MIN_ROWS};
use crate::error::{DetectorError, Result};
use crate::health::{components, HealthRegistry};
use crate::models::{AlignedRow, AnomalyRecord, Sample};
use crate::observability::{DetectorMetrics, StructuredLogger};
use crate::source::{MetricSource, DEFAULT_LATENCY_QUERY, DEFAULT_MEMORY_QUERY};
use crate::store::AnomalyStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default trailing window (10 minutes)
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Default pause between cycles (30 seconds)
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for the detection loop
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Trailing window queried each cycle
    pub window: Duration,
    /// Sleep between cycles
    pub interval: Duration,
    /// Query for the latency signal (first feature)
    pub latency_signal: String,
    /// Query for the memory signal (second feature)
    pub memory_signal: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            interval: DEFAULT_INTERVAL,
            latency_signal: DEFAULT_LATENCY_QUERY.to_string(),
            memory_signal: DEFAULT_MEMORY_QUERY.to_string(),
        }
    }
}

/// Counters for one completed cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Aligned rows in the window
    pub rows: usize,
    /// Rows labelled anomalous
    pub anomalies: usize,
    /// New records written to the store
    pub recorded: usize,
    /// Anomalies suppressed as already recorded
    pub duplicates: usize,
    /// Anomalies lost to store read or write failures
    pub failed: usize,
}

/// Result of a single detection cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// Nothing was scored this cycle
    Skipped(DetectorError),
    /// The window was scored
    Completed(CycleReport),
}

impl CycleOutcome {
    /// Label used for the cycles metric
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Skipped(e) => e.kind(),
            CycleOutcome::Completed(_) => "completed",
        }
    }
}

/// Periodically detects anomalies and records them
pub struct DetectionLoop {
    source: Arc<dyn MetricSource>,
    store: Arc<dyn AnomalyStore>,
    scorer: AnomalyScorer,
    dedup: Deduplicator,
    config: DetectionConfig,
    health: HealthRegistry,
    metrics: DetectorMetrics,
    logger: StructuredLogger,
}

impl DetectionLoop {
    /// Create a new detection loop
    pub fn new(
        source: Arc<dyn MetricSource>,
        store: Arc<dyn AnomalyStore>,
        scorer: AnomalyScorer,
        config: DetectionConfig,
        health: HealthRegistry,
    ) -> Self {
        Self {
            source,
            dedup: Deduplicator::new(store.clone()),
            store,
            scorer,
            config,
            health,
            metrics: DetectorMetrics::new(),
            logger: StructuredLogger::new("anomaly-agent"),
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Run cycles until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            window_secs = self.config.window.as_secs(),
            interval_secs = self.config.interval.as_secs(),
            contamination = self.scorer.config().contamination,
            "Starting detection loop"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            self.run_cycle(Utc::now()).await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Shutting down detection loop");
    }

    /// Run one cycle over the window ending at `now`
    ///
    /// Never fails: every error is logged and folded into the outcome.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleOutcome {
        let start = Instant::now();

        let outcome = match self.load_window(now).await {
            Ok(rows) => match self.scorer.score(&rows) {
                Ok(scored) => {
                    let mut report = CycleReport {
                        rows: rows.len(),
                        ..Default::default()
                    };
                    for row in scored.iter().filter(|s| s.is_anomalous()) {
                        report.anomalies += 1;
                        self.record(&row.row, &mut report).await;
                    }
                    CycleOutcome::Completed(report)
                }
                Err(e) => CycleOutcome::Skipped(e),
            },
            Err(e) => CycleOutcome::Skipped(e),
        };

        self.metrics
            .observe_cycle_duration(start.elapsed().as_secs_f64());
        self.metrics.inc_cycle(outcome.label());
        self.health.record_cycle(now.timestamp()).await;

        match &outcome {
            CycleOutcome::Skipped(e) => {
                if let DetectorError::ModelFit(reason) = e {
                    self.health
                        .set_degraded(components::DETECTOR, reason.clone())
                        .await;
                }
                self.logger.log_cycle_skipped(e.kind(), &e.to_string());
            }
            CycleOutcome::Completed(r) => {
                self.health.set_healthy(components::DETECTOR).await;
                self.logger.log_cycle_completed(
                    r.rows,
                    r.anomalies,
                    r.recorded,
                    r.duplicates,
                    r.failed,
                );
            }
        }

        outcome
    }

    /// Fetch both signals and align them; fails with a skip-cycle error
    async fn load_window(&self, now: DateTime<Utc>) -> Result<Vec<AlignedRow>> {
        let window = chrono::Duration::from_std(self.config.window)
            .map_err(|e| DetectorError::invalid_config("window", e.to_string()))?;
        let start = now - window;

        let latency = self.fetch(&self.config.latency_signal, start, now).await?;
        let memory = self.fetch(&self.config.memory_signal, start, now).await?;
        self.health.set_healthy(components::METRIC_SOURCE).await;

        let rows = align(&latency, &memory)?;
        self.metrics.set_window_rows(rows.len());

        if rows.len() < MIN_ROWS {
            return Err(DetectorError::InsufficientData {
                required: MIN_ROWS,
                got: rows.len(),
            });
        }

        debug!(
            latency_samples = latency.len(),
            memory_samples = memory.len(),
            rows = rows.len(),
            "Window aligned"
        );
        Ok(rows)
    }

    async fn fetch(
        &self,
        signal: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sample>> {
        match self.source.range_query(signal, start, end).await {
            Ok(samples) => Ok(samples),
            Err(e) => {
                self.metrics.inc_source_errors();
                self.health
                    .set_degraded(components::METRIC_SOURCE, e.to_string())
                    .await;
                warn!(signal = %signal, error = %e, "Metric source query failed");
                Err(e)
            }
        }
    }

    /// Deduplicate and persist one anomalous row
    async fn record(&self, row: &AlignedRow, report: &mut CycleReport) {
        let candidate = AnomalyRecord::from_row(row);

        let record = match self.dedup.check(candidate).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                report.duplicates += 1;
                self.metrics.inc_duplicates_suppressed();
                return;
            }
            Err(e) => {
                report.failed += 1;
                self.store_failed(&e).await;
                return;
            }
        };

        match self.store.append(&record).await {
            Ok(id) => {
                report.recorded += 1;
                self.metrics.inc_anomalies_recorded();
                self.health.set_healthy(components::STORE).await;
                self.logger.log_anomaly(
                    &id,
                    &record.timestamp.to_rfc3339(),
                    record.value_a,
                    record.value_b,
                    &record.detector_kind,
                );
            }
            Err(e) => {
                report.failed += 1;
                self.store_failed(&e).await;
            }
        }
    }

    async fn store_failed(&self, error: &DetectorError) {
        self.metrics.inc_store_errors();
        self.health
            .set_degraded(components::STORE, error.to_string())
            .await;
        warn!(error = %error, "Anomaly store operation failed, anomaly dropped");
    }
}

/// Builder for creating the detection loop
pub struct DetectionLoopBuilder {
    source: Option<Arc<dyn MetricSource>>,
    store: Option<Arc<dyn AnomalyStore>>,
    scorer: ScorerConfig,
    config: DetectionConfig,
    health: Option<HealthRegistry>,
}

impl DetectionLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            source: None,
            store: None,
            scorer: ScorerConfig::default(),
            config: DetectionConfig::default(),
            health: None,
        }
    }

    /// Set the metric source
    pub fn source(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the anomaly store
    pub fn store(mut self, store: Arc<dyn AnomalyStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the trailing window
    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    /// Set the pause between cycles
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the signal queries
    pub fn signals(mut self, latency: impl Into<String>, memory: impl Into<String>) -> Self {
        self.config.latency_signal = latency.into();
        self.config.memory_signal = memory.into();
        self
    }

    /// Set the expected outlier fraction
    pub fn contamination(mut self, contamination: f64) -> Self {
        self.scorer.contamination = contamination;
        self
    }

    /// Set the forest RNG seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.scorer.forest.seed = seed;
        self
    }

    /// Share a health registry with the API
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Build the detection loop
    pub fn build(self) -> Result<DetectionLoop> {
        let source = self
            .source
            .ok_or_else(|| DetectorError::invalid_config("source", "metric source is required"))?;
        let store = self
            .store
            .ok_or_else(|| DetectorError::invalid_config("store", "anomaly store is required"))?;

        if self.config.window.is_zero() {
            return Err(DetectorError::invalid_config("window", "must be non-zero"));
        }
        if self.config.interval.is_zero() {
            return Err(DetectorError::invalid_config("interval", "must be non-zero"));
        }

        let scorer = AnomalyScorer::new(self.scorer)?;

        Ok(DetectionLoop::new(
            source,
            store,
            scorer,
            self.config,
            self.health.unwrap_or_default(),
        ))
    }
}

impl Default for DetectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
