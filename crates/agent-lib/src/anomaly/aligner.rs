//! Sample alignment
//!
//! Joins the latency and memory streams on exact timestamp equality.
//! No interpolation or nearest-neighbour matching is done: a row exists only
//! if both signals have a sample at the same instant.

use crate::error::{DetectorError, Result};
use crate::models::{AlignedRow, Sample};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Align two sample streams into chronologically ordered rows
///
/// # Arguments
/// * `a` - Samples for the first signal (latency)
/// * `b` - Samples for the second signal (memory)
///
/// # Returns
/// * `Err(DetectorError::NoData)` if either stream is empty
/// * `Ok(rows)` with one row per timestamp present in both streams; the
///   vector is empty when the timestamp sets are disjoint
pub fn align(a: &[Sample], b: &[Sample]) -> Result<Vec<AlignedRow>> {
    if a.is_empty() || b.is_empty() {
        return Err(DetectorError::NoData);
    }

    // First occurrence wins for duplicate timestamps within one stream
    let mut left: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    for sample in a {
        left.entry(sample.timestamp).or_insert(sample.value);
    }

    let mut right: HashMap<DateTime<Utc>, f64> = HashMap::with_capacity(b.len());
    for sample in b {
        right.entry(sample.timestamp).or_insert(sample.value);
    }

    let rows = left
        .into_iter()
        .filter_map(|(timestamp, value_a)| {
            right.get(&timestamp).map(|&value_b| AlignedRow {
                timestamp,
                value_a,
                value_b,
            })
        })
        .collect();

    Ok(rows)
}
