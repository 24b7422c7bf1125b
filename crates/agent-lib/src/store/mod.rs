//! Anomaly persistence
//!
//! The store is the only state shared between the detection loop and the
//! query API. Writes are serialised, reads run concurrently with them.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::{DetectorError, Result};
use crate::models::{AnomalyRecord, StoredAnomaly};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub use async_trait::async_trait;

/// Connection string selecting the in-process store
pub const MEMORY_STORE_URL: &str = "memory://";

/// Trait for anomaly store implementations
#[async_trait]
pub trait AnomalyStore: Send + Sync {
    /// Persist a record and return its store-assigned id
    ///
    /// Timestamps are unique: appending a second record at an existing
    /// timestamp fails with `DetectorError::StoreWrite`.
    async fn append(&self, record: &AnomalyRecord) -> Result<String>;

    /// Check whether a record exists at exactly `timestamp`
    async fn exists_at(&self, timestamp: DateTime<Utc>) -> Result<bool>;

    /// Most recent records, newest first, at most `limit`
    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredAnomaly>>;

    /// Release connections; the store must not be used afterwards
    async fn close(&self) {}
}

/// Open a store from a connection string
///
/// * `memory://` - in-process store, lost on restart
/// * `sqlite:...` - SQLite database (e.g. `sqlite://anomalies.db`)
pub async fn connect(url: &str) -> Result<Arc<dyn AnomalyStore>> {
    if url == MEMORY_STORE_URL {
        tracing::info!("Using in-memory anomaly store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    if url.starts_with("sqlite:") {
        tracing::info!(url = %url, "Using SQLite anomaly store");
        return Ok(Arc::new(SqliteStore::connect(url).await?));
    }

    Err(DetectorError::invalid_config(
        "store_url",
        format!("unsupported store URL '{}'", url),
    ))
}
