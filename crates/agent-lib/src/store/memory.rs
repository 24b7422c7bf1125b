//! In-process anomaly store

use super::{async_trait, AnomalyStore};
use crate::error::{DetectorError, Result};
use crate::models::{AnomalyRecord, StoredAnomaly};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Anomaly store kept in memory, ordered by timestamp
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<StoredAnomaly>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AnomalyStore for MemoryStore {
    async fn append(&self, record: &AnomalyRecord) -> Result<String> {
        let mut records = self.records.write().await;

        match records.binary_search_by(|r| r.record.timestamp.cmp(&record.timestamp)) {
            Ok(_) => Err(DetectorError::StoreWrite(format!(
                "record already exists at {}",
                record.timestamp
            ))),
            Err(pos) => {
                let id = uuid::Uuid::new_v4().to_string();
                records.insert(
                    pos,
                    StoredAnomaly {
                        id: id.clone(),
                        record: record.clone(),
                    },
                );
                Ok(id)
            }
        }
    }

    async fn exists_at(&self, timestamp: DateTime<Utc>) -> Result<bool> {
        let records = self.records.read().await;
        Ok(records
            .binary_search_by(|r| r.record.timestamp.cmp(&timestamp))
            .is_ok())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredAnomaly>> {
        let records = self.records.read().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}
