//! End-to-end tests for the detection loop
//!
//! These tests drive full cycles with scripted metric sources and an
//! instrumented in-memory store, without any network access.

#[cfg(test)]
mod detection_cycle_tests {
    use crate::detector::{CycleOutcome, CycleReport, DetectionLoop, DetectionLoopBuilder};
    use crate::error::{DetectorError, Result};
    use crate::health::{components, ComponentStatus, HealthRegistry};
    use crate::models::{AnomalyRecord, Sample, StoredAnomaly, DETECTOR_KIND};
    use crate::source::MetricSource;
    use crate::store::{AnomalyStore, MemoryStore};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const LATENCY: &str = "latency";
    const MEMORY: &str = "memory";

    /// Index of the outlier sample in `scenario_samples`
    const OUTLIER_INDEX: i64 = 5;

    fn base_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    /// Source serving fixed series, filtered to the requested range
    struct ScriptedSource {
        latency: Vec<Sample>,
        memory: Vec<Sample>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(latency: Vec<Sample>, memory: Vec<Sample>) -> Self {
            Self {
                latency,
                memory,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MetricSource for ScriptedSource {
        async fn range_query(
            &self,
            signal: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Sample>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let series = match signal {
                LATENCY => &self.latency,
                MEMORY => &self.memory,
                other => {
                    return Err(DetectorError::SourceUnavailable(format!(
                        "unknown signal {}",
                        other
                    )))
                }
            };
            Ok(series
                .iter()
                .filter(|s| s.timestamp >= start && s.timestamp < end)
                .copied()
                .collect())
        }
    }

    /// Source that is always unreachable
    struct UnreachableSource;

    #[async_trait]
    impl MetricSource for UnreachableSource {
        async fn range_query(
            &self,
            _signal: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<Sample>> {
            Err(DetectorError::SourceUnavailable("connection refused".into()))
        }
    }

    /// Memory store that counts calls and can be told to reject writes
    #[derive(Default)]
    struct InstrumentedStore {
        inner: MemoryStore,
        appends: AtomicUsize,
        lookups: AtomicUsize,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl AnomalyStore for InstrumentedStore {
        async fn append(&self, record: &AnomalyRecord) -> Result<String> {
            self.appends.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(DetectorError::StoreWrite("disk full".into()));
            }
            self.inner.append(record).await
        }

        async fn exists_at(&self, timestamp: DateTime<Utc>) -> Result<bool> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.exists_at(timestamp).await
        }

        async fn list_recent(&self, limit: usize) -> Result<Vec<StoredAnomaly>> {
            self.inner.list_recent(limit).await
        }
    }

    /// `count` samples one minute apart ending just before `base_time()`,
    /// clustered around (0.05s, 1GB) with one (5s, 9GB) outlier
    fn scenario_samples(count: i64) -> (Vec<Sample>, Vec<Sample>) {
        let first = base_time() - ChronoDuration::minutes(10);
        let mut latency = Vec::new();
        let mut memory = Vec::new();

        for k in 0..count {
            let ts = first + ChronoDuration::minutes(k);
            let (a, b) = if k == OUTLIER_INDEX {
                (5.0, 9e9)
            } else {
                (
                    0.05 + 0.0005 * ((k * 7) % 5) as f64,
                    1e9 + 1e6 * ((k * 3) % 4) as f64,
                )
            };
            latency.push(Sample::new(ts, a));
            memory.push(Sample::new(ts, b));
        }

        (latency, memory)
    }

    fn completed(outcome: CycleOutcome) -> CycleReport {
        match outcome {
            CycleOutcome::Completed(report) => report,
            other => panic!("expected a completed cycle, got {:?}", other),
        }
    }

    fn build_loop(
        source: Arc<dyn MetricSource>,
        store: Arc<dyn AnomalyStore>,
        health: HealthRegistry,
    ) -> DetectionLoop {
        DetectionLoopBuilder::new()
            .source(source)
            .store(store)
            .signals(LATENCY, MEMORY)
            .window(Duration::from_secs(600))
            .interval(Duration::from_secs(30))
            .contamination(0.1)
            .seed(42)
            .health(health)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_single_outlier_is_recorded() {
        let (latency, memory) = scenario_samples(10);
        let store = Arc::new(InstrumentedStore::default());
        let detection = build_loop(
            Arc::new(ScriptedSource::new(latency, memory)),
            store.clone(),
            HealthRegistry::new(),
        );

        let outcome = detection.run_cycle(base_time()).await;

        let report = completed(outcome);
        assert_eq!(report.rows, 10);
        assert_eq!(report.anomalies, 1);
        assert_eq!(report.recorded, 1);

        let stored = store.list_recent(50).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].record.value_a, 5.0);
        assert_eq!(stored[0].record.value_b, 9e9);
        assert_eq!(stored[0].record.detector_kind, DETECTOR_KIND);
        assert_eq!(
            stored[0].record.timestamp,
            base_time() - ChronoDuration::minutes(10 - OUTLIER_INDEX)
        );

        // Only the anomalous row is looked up
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_short_window_is_skipped_without_writes() {
        let (latency, memory) = scenario_samples(4);
        let store = Arc::new(InstrumentedStore::default());
        let detection = build_loop(
            Arc::new(ScriptedSource::new(latency, memory)),
            store.clone(),
            HealthRegistry::new(),
        );

        let outcome = detection.run_cycle(base_time()).await;

        assert!(matches!(
            outcome,
            CycleOutcome::Skipped(DetectorError::InsufficientData {
                required: 6,
                got: 4
            })
        ));
        assert_eq!(outcome.label(), "insufficient_data");
        assert_eq!(store.appends.load(Ordering::SeqCst), 0);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
        assert!(store.inner.is_empty().await);
    }

    #[tokio::test]
    async fn test_overlapping_windows_are_idempotent() {
        // Eleven samples: the first window sees 0..=9, the second 1..=10
        let (latency, memory) = scenario_samples(11);
        let store = Arc::new(InstrumentedStore::default());
        let detection = build_loop(
            Arc::new(ScriptedSource::new(latency, memory)),
            store.clone(),
            HealthRegistry::new(),
        );

        let first = detection.run_cycle(base_time()).await;
        assert!(matches!(first, CycleOutcome::Completed(ref r) if r.recorded == 1));
        assert_eq!(store.inner.len().await, 1);

        let second = detection
            .run_cycle(base_time() + ChronoDuration::seconds(30))
            .await;
        let report = completed(second);
        assert_eq!(report.rows, 10);
        assert_eq!(report.recorded, 0);
        assert_eq!(report.duplicates, 1);
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_rerunning_same_window_is_idempotent() {
        let (latency, memory) = scenario_samples(10);
        let store = Arc::new(InstrumentedStore::default());
        let detection = build_loop(
            Arc::new(ScriptedSource::new(latency, memory)),
            store.clone(),
            HealthRegistry::new(),
        );

        for _ in 0..3 {
            detection.run_cycle(base_time()).await;
        }

        assert_eq!(store.inner.len().await, 1);
        assert_eq!(store.appends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreachable_source_skips_cycle() {
        let store = Arc::new(InstrumentedStore::default());
        let health = HealthRegistry::with_default_components().await;
        let detection = build_loop(Arc::new(UnreachableSource), store.clone(), health.clone());

        let outcome = detection.run_cycle(base_time()).await;

        assert!(matches!(
            outcome,
            CycleOutcome::Skipped(DetectorError::SourceUnavailable(_))
        ));
        assert_eq!(store.appends.load(Ordering::SeqCst), 0);

        let status = health.health().await;
        assert_eq!(
            status.components[components::METRIC_SOURCE].status,
            ComponentStatus::Degraded
        );
        assert_eq!(status.last_cycle_timestamp, Some(base_time().timestamp()));
    }

    #[tokio::test]
    async fn test_source_recovers_health_on_success() {
        let (latency, memory) = scenario_samples(10);
        let health = HealthRegistry::with_default_components().await;
        health
            .set_degraded(components::METRIC_SOURCE, "previous failure")
            .await;

        let detection = build_loop(
            Arc::new(ScriptedSource::new(latency, memory)),
            Arc::new(InstrumentedStore::default()),
            health.clone(),
        );
        detection.run_cycle(base_time()).await;

        assert_eq!(health.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_empty_signal_is_no_data() {
        let (latency, _) = scenario_samples(10);
        let detection = build_loop(
            Arc::new(ScriptedSource::new(latency, Vec::new())),
            Arc::new(InstrumentedStore::default()),
            HealthRegistry::new(),
        );

        let outcome = detection.run_cycle(base_time()).await;
        assert!(matches!(outcome, CycleOutcome::Skipped(DetectorError::NoData)));
    }

    #[tokio::test]
    async fn test_disjoint_signals_are_insufficient() {
        let (latency, memory) = scenario_samples(10);
        let shifted: Vec<Sample> = memory
            .into_iter()
            .map(|s| Sample::new(s.timestamp + ChronoDuration::seconds(7), s.value))
            .collect();

        let detection = build_loop(
            Arc::new(ScriptedSource::new(latency, shifted)),
            Arc::new(InstrumentedStore::default()),
            HealthRegistry::new(),
        );

        let outcome = detection.run_cycle(base_time()).await;
        assert!(matches!(
            outcome,
            CycleOutcome::Skipped(DetectorError::InsufficientData { got: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_constant_window_is_model_fit_skip() {
        let first = base_time() - ChronoDuration::minutes(10);
        let flat: Vec<Sample> = (0..10)
            .map(|k| Sample::new(first + ChronoDuration::minutes(k), 1.0))
            .collect();
        let health = HealthRegistry::with_default_components().await;

        let detection = build_loop(
            Arc::new(ScriptedSource::new(flat.clone(), flat)),
            Arc::new(InstrumentedStore::default()),
            health.clone(),
        );

        let outcome = detection.run_cycle(base_time()).await;
        assert!(matches!(outcome, CycleOutcome::Skipped(DetectorError::ModelFit(_))));
        assert_eq!(
            health.health().await.components[components::DETECTOR].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_store_write_failure_is_not_fatal() {
        let (latency, memory) = scenario_samples(10);
        let store = Arc::new(InstrumentedStore::default());
        store.fail_writes.store(true, Ordering::SeqCst);
        let health = HealthRegistry::with_default_components().await;

        let detection = build_loop(
            Arc::new(ScriptedSource::new(latency, memory)),
            store.clone(),
            health.clone(),
        );

        let outcome = detection.run_cycle(base_time()).await;
        let report = completed(outcome);
        assert_eq!(report.anomalies, 1);
        assert_eq!(report.recorded, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(
            health.health().await.components[components::STORE].status,
            ComponentStatus::Degraded
        );

        // The next cycle writes normally once the store recovers
        store.fail_writes.store(false, Ordering::SeqCst);
        let outcome = detection.run_cycle(base_time()).await;
        assert!(matches!(outcome, CycleOutcome::Completed(ref r) if r.recorded == 1));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_no_cycle() {
        let (latency, memory) = scenario_samples(10);
        let source = Arc::new(ScriptedSource::new(latency, memory));
        let detection = build_loop(
            source.clone(),
            Arc::new(InstrumentedStore::default()),
            HealthRegistry::new(),
        );

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        detection.run(shutdown).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let (latency, memory) = scenario_samples(10);
        let source = Arc::new(ScriptedSource::new(latency, memory));
        let detection = DetectionLoopBuilder::new()
            .source(source.clone())
            .store(Arc::new(InstrumentedStore::default()))
            .signals(LATENCY, MEMORY)
            .interval(Duration::from_secs(3600))
            .build()
            .unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(detection.run(shutdown.clone()));

        // Wait for the first cycle (two queries) to finish
        while source.calls.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop after cancellation")
            .unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_builder_requires_source_and_store() {
        let missing_source = DetectionLoopBuilder::new()
            .store(Arc::new(MemoryStore::new()))
            .build();
        assert!(matches!(missing_source, Err(DetectorError::InvalidConfig { .. })));

        let missing_store = DetectionLoopBuilder::new()
            .source(Arc::new(UnreachableSource))
            .build();
        assert!(matches!(missing_store, Err(DetectorError::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        let build = |b: DetectionLoopBuilder| {
            b.source(Arc::new(UnreachableSource))
                .store(Arc::new(MemoryStore::new()))
                .build()
        };

        assert!(build(DetectionLoopBuilder::new().interval(Duration::ZERO)).is_err());
        assert!(build(DetectionLoopBuilder::new().window(Duration::ZERO)).is_err());
        assert!(build(DetectionLoopBuilder::new().contamination(0.7)).is_err());
        assert!(build(DetectionLoopBuilder::new()).is_ok());
    }

    #[test]
    fn test_default_config() {
        let detection = DetectionLoopBuilder::new()
            .source(Arc::new(UnreachableSource))
            .store(Arc::new(MemoryStore::new()))
            .build()
            .unwrap();

        assert_eq!(detection.config().window, Duration::from_secs(600));
        assert_eq!(detection.config().interval, Duration::from_secs(30));
    }
}
