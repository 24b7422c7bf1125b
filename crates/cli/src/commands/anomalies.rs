//! Anomaly listing

use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{format_bytes, format_latency, print_table, OutputFormat};

/// Row for the anomalies table
#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Detector")]
    detector: String,
    #[tabled(rename = "ID")]
    id: String,
}

/// List the most recent anomalies, newest first
pub async fn list_anomalies(
    client: &ApiClient,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let mut anomalies = client.anomalies().await?;
    if let Some(limit) = limit {
        anomalies.truncate(limit);
    }

    let rows: Vec<AnomalyRow> = anomalies
        .iter()
        .map(|a| AnomalyRow {
            timestamp: a.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            latency: format_latency(a.value_a),
            memory: format_bytes(a.value_b),
            detector: a.detector_kind.clone(),
            id: a.id.clone(),
        })
        .collect();

    print_table(rows, &anomalies, format)?;

    if matches!(format, OutputFormat::Table) && !anomalies.is_empty() {
        println!("\nTotal: {} anomalies", anomalies.len());
    }

    Ok(())
}
