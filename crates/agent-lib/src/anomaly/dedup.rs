//! Duplicate suppression
//!
//! The anomaly timestamp is the idempotency key: a candidate whose timestamp
//! is already present in the store is dropped, so re-scoring overlapping
//! windows never writes the same anomaly twice.

use crate::error::Result;
use crate::models::AnomalyRecord;
use crate::store::AnomalyStore;
use std::sync::Arc;
use tracing::debug;

/// Filters candidate anomalies against the store
#[derive(Clone)]
pub struct Deduplicator {
    store: Arc<dyn AnomalyStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn AnomalyStore>) -> Self {
        Self { store }
    }

    /// Pass the candidate through unless a record already exists at its timestamp
    ///
    /// # Returns
    /// * `Ok(Some(candidate))` if no record exists at the timestamp
    /// * `Ok(None)` if the candidate is a duplicate
    /// * `Err(DetectorError::StoreRead)` if the lookup failed
    pub async fn check(&self, candidate: AnomalyRecord) -> Result<Option<AnomalyRecord>> {
        if self.store.exists_at(candidate.timestamp).await? {
            debug!(timestamp = %candidate.timestamp, "Suppressing duplicate anomaly");
            return Ok(None);
        }
        Ok(Some(candidate))
    }
}
