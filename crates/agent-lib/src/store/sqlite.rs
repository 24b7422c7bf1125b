//! SQLite-backed anomaly store
//!
//! Timestamps are stored as Unix milliseconds with a UNIQUE index, which both
//! orders `list_recent` and backs the timestamp idempotency key. File
//! databases run in WAL mode so API reads never wait on the detector's writes.

use super::{async_trait, AnomalyStore};
use crate::error::{DetectorError, Result};
use crate::models::{AnomalyRecord, StoredAnomaly};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS anomalies (
    id TEXT PRIMARY KEY NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    value_a REAL NOT NULL,
    value_b REAL NOT NULL,
    detector_kind TEXT NOT NULL,
    description TEXT NOT NULL
)
"#;

const CREATE_TIMESTAMP_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_anomalies_timestamp ON anomalies (timestamp_ms)";

/// Maximum pool size for file databases
const MAX_CONNECTIONS: u32 = 4;

/// Anomaly store persisted in SQLite
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and ensure the schema
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| DetectorError::invalid_config("store_url", e.to_string()))?
            .create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives and dies with its single connection
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| DetectorError::StoreRead(format!("failed to open {}: {}", url, e)))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url = %url, "SQLite anomaly store ready");

        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in [CREATE_TABLE, CREATE_TIMESTAMP_INDEX] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DetectorError::StoreWrite(format!("schema setup failed: {}", e)))?;
        }
        Ok(())
    }

    /// Total number of stored records
    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM anomalies")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DetectorError::StoreRead(e.to_string()))
    }
}

#[async_trait]
impl AnomalyStore for SqliteStore {
    async fn append(&self, record: &AnomalyRecord) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO anomalies (id, timestamp_ms, value_a, value_b, detector_kind, description) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(record.timestamp.timestamp_millis())
        .bind(record.value_a)
        .bind(record.value_b)
        .bind(&record.detector_kind)
        .bind(&record.description)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => DetectorError::StoreWrite(
                format!("record already exists at {}", record.timestamp),
            ),
            _ => DetectorError::StoreWrite(e.to_string()),
        })?;

        debug!(id = %id, timestamp = %record.timestamp, "Stored anomaly");
        Ok(id)
    }

    async fn exists_at(&self, timestamp: DateTime<Utc>) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM anomalies WHERE timestamp_ms = ? LIMIT 1")
                .bind(timestamp.timestamp_millis())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DetectorError::StoreRead(e.to_string()))?;

        Ok(found.is_some())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredAnomaly>> {
        let rows = sqlx::query(
            "SELECT id, timestamp_ms, value_a, value_b, detector_kind, description \
             FROM anomalies ORDER BY timestamp_ms DESC LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DetectorError::StoreRead(e.to_string()))?;

        rows.iter().map(row_to_anomaly).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("SQLite anomaly store closed");
    }
}

fn row_to_anomaly(row: &sqlx::sqlite::SqliteRow) -> Result<StoredAnomaly> {
    let read = |e: sqlx::Error| DetectorError::StoreRead(e.to_string());

    let timestamp_ms: i64 = row.try_get("timestamp_ms").map_err(read)?;
    let timestamp = DateTime::from_timestamp_millis(timestamp_ms).ok_or_else(|| {
        DetectorError::StoreRead(format!("invalid stored timestamp {}", timestamp_ms))
    })?;

    Ok(StoredAnomaly {
        id: row.try_get("id").map_err(read)?,
        record: AnomalyRecord {
            timestamp,
            value_a: row.try_get("value_a").map_err(read)?,
            value_b: row.try_get("value_b").map_err(read)?,
            detector_kind: row.try_get("detector_kind").map_err(read)?,
            description: row.try_get("description").map_err(read)?,
        },
    })
}
