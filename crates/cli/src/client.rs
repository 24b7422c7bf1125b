//! API client for the anomaly detector's HTTP API

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the anomaly detector
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(base_url).context("Invalid API URL")?;
        // Keep a path prefix (e.g. behind a reverse proxy) when joining
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Most recent anomalies, newest first
    pub async fn anomalies(&self) -> Result<Vec<Anomaly>> {
        self.get("api/anomalies").await
    }

    /// Detector health; an unhealthy detector answers 503 with the same body
    pub async fn health(&self) -> Result<Health> {
        let url = self.base_url.join("healthz").context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Tail latency in seconds
    pub value_a: f64,
    /// Memory usage in bytes
    pub value_b: f64,
    pub detector_kind: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cycle_timestamp: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_anomalies_parses_api_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/anomalies")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"id":"a1","timestamp":"2023-11-14T22:13:20Z","value_a":1.9,
                    "value_b":6.1e9,"detector_kind":"ML_ISOLATION_FOREST",
                    "description":"Detected unusual correlation between latency and memory"}]"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let anomalies = client.anomalies().await.unwrap();

        mock.assert_async().await;
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].id, "a1");
        assert_eq!(anomalies[0].timestamp.timestamp(), 1_700_000_000);
        assert_eq!(anomalies[0].detector_kind, "ML_ISOLATION_FOREST");
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/anomalies")
            .with_status(500)
            .with_body(r#"{"error":"store read failed"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.anomalies().await.unwrap_err();

        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("store read failed"));
    }

    #[tokio::test]
    async fn test_health_accepts_service_unavailable_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_body(
                r#"{"status":"unhealthy","components":{"store":{"status":"unhealthy",
                    "message":"database closed","last_check_timestamp":1700000000}}}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let health = client.health().await.unwrap();

        assert_eq!(health.status, "unhealthy");
        assert_eq!(
            health.components["store"].message.as_deref(),
            Some("database closed")
        );
        assert!(health.last_cycle_timestamp.is_none());
    }

    #[tokio::test]
    async fn test_base_url_path_prefix_is_kept() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/detector/api/anomalies")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let client = ApiClient::new(&format!("{}/detector", server.url())).unwrap();
        let anomalies = client.anomalies().await.unwrap();

        mock.assert_async().await;
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
