//! Core data models for the anomaly detector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Detector kind recorded on every anomaly produced by the isolation forest
pub const DETECTOR_KIND: &str = "ML_ISOLATION_FOREST";

/// Human-readable description recorded on every anomaly
pub const ANOMALY_DESCRIPTION: &str = "Detected unusual correlation between latency and memory";

/// A single timestamped value returned by a metric source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Latency and memory observed at the same instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignedRow {
    pub timestamp: DateTime<Utc>,
    /// Tail latency in seconds
    pub value_a: f64,
    /// Memory usage in bytes
    pub value_b: f64,
}

/// Binary decision produced by the scorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Normal,
    Anomalous,
}

/// Aligned row with its label
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRow {
    pub row: AlignedRow,
    pub label: Label,
}

impl ScoredRow {
    pub fn is_anomalous(&self) -> bool {
        self.label == Label::Anomalous
    }
}

/// A detected anomaly, ready to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub timestamp: DateTime<Utc>,
    pub value_a: f64,
    pub value_b: f64,
    pub detector_kind: String,
    pub description: String,
}

impl AnomalyRecord {
    /// Build the record for an anomalous row
    pub fn from_row(row: &AlignedRow) -> Self {
        Self {
            timestamp: row.timestamp,
            value_a: row.value_a,
            value_b: row.value_b,
            detector_kind: DETECTOR_KIND.to_string(),
            description: ANOMALY_DESCRIPTION.to_string(),
        }
    }
}

/// An anomaly record together with its store-assigned id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnomaly {
    pub id: String,
    #[serde(flatten)]
    pub record: AnomalyRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_from_row() {
        let row = AlignedRow {
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            value_a: 0.25,
            value_b: 2.5e9,
        };

        let record = AnomalyRecord::from_row(&row);
        assert_eq!(record.timestamp, row.timestamp);
        assert_eq!(record.detector_kind, DETECTOR_KIND);
        assert_eq!(record.description, ANOMALY_DESCRIPTION);
    }

    #[test]
    fn test_stored_anomaly_serializes_flat() {
        let stored = StoredAnomaly {
            id: "abc".to_string(),
            record: AnomalyRecord::from_row(&AlignedRow {
                timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                value_a: 5.0,
                value_b: 9e9,
            }),
        };

        let json = serde_json::to_value(&stored).unwrap();
        let obj = json.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "description",
                "detector_kind",
                "id",
                "timestamp",
                "value_a",
                "value_b"
            ]
        );
        assert_eq!(json["timestamp"], "2023-11-14T22:13:20Z");
        assert_eq!(json["detector_kind"], "ML_ISOLATION_FOREST");
    }
}
