//! Anomaly Agent - latency/memory anomaly detector
//!
//! Polls the metric source on a fixed interval, records anomalies in the
//! store and serves the most recent ones over HTTP.

use anomaly_lib::{
    api,
    detector::DetectionLoopBuilder,
    health::HealthRegistry,
    observability::{DetectorMetrics, StructuredLogger},
    source::{PrometheusSource, PrometheusSourceConfig},
    store,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting anomaly-agent");

    // Load configuration
    let config = config::AgentConfig::load()?;
    info!(
        source_url = %config.source_url,
        window_secs = config.window_secs,
        poll_interval_secs = config.poll_interval_secs,
        "Agent configured"
    );

    let health_registry = HealthRegistry::with_default_components().await;
    let metrics = DetectorMetrics::new();
    let logger = StructuredLogger::new("anomaly-agent");

    // Collaborators are built once and handed to both tasks
    let store = store::connect(&config.store_url)
        .await
        .context("Failed to open anomaly store")?;
    let source = PrometheusSource::new(PrometheusSourceConfig {
        base_url: config.source_url.clone(),
        step: config.query_step(),
        request_timeout: config.source_timeout(),
    })
    .context("Failed to create metric source client")?;

    let detection = DetectionLoopBuilder::new()
        .source(Arc::new(source))
        .store(store.clone())
        .window(config.window())
        .interval(config.poll_interval())
        .signals(config.latency_query.clone(), config.memory_query.clone())
        .contamination(config.contamination)
        .seed(config.seed)
        .health(health_registry.clone())
        .build()
        .context("Failed to build detection loop")?;

    logger.log_startup(AGENT_VERSION, &config.store_url, &config.source_url);

    let shutdown = CancellationToken::new();
    let app_state = Arc::new(api::AppState::new(
        store.clone(),
        health_registry.clone(),
        metrics,
    ));

    let detection_handle = tokio::spawn(detection.run(shutdown.child_token()));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown.child_token(),
    ));

    health_registry.set_ready(true).await;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    shutdown.cancel();

    if let Err(e) = detection_handle.await {
        error!(error = %e, "Detection loop task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    store.close().await;
    info!("Shutdown complete");

    Ok(())
}
