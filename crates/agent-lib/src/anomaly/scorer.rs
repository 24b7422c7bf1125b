//! Window scoring
//!
//! Fits a fresh isolation forest on the `(latency, memory)` matrix of the
//! current window and labels each row. Nothing is carried between windows.

use super::isolation_forest::{ForestParams, IsolationForest};
use crate::error::{DetectorError, Result};
use crate::models::{AlignedRow, Label, ScoredRow};

/// Minimum aligned rows required before a model is fitted
pub const MIN_ROWS: usize = 6;

/// Default expected outlier fraction
pub const DEFAULT_CONTAMINATION: f64 = 0.05;

/// Configuration for the anomaly scorer
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Expected fraction of anomalous rows, in (0, 0.5]
    pub contamination: f64,
    /// Forest hyper-parameters
    pub forest: ForestParams,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            contamination: DEFAULT_CONTAMINATION,
            forest: ForestParams::default(),
        }
    }
}

impl ScorerConfig {
    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(DetectorError::invalid_config(
                "contamination",
                format!("must be in (0, 0.5], got {}", self.contamination),
            ));
        }
        if self.forest.n_trees == 0 {
            return Err(DetectorError::invalid_config("n_trees", "must be at least 1"));
        }
        if self.forest.max_samples < 2 {
            return Err(DetectorError::invalid_config("max_samples", "must be at least 2"));
        }
        Ok(())
    }
}

/// Labels rows of a window as normal or anomalous
#[derive(Debug, Clone)]
pub struct AnomalyScorer {
    config: ScorerConfig,
}

impl AnomalyScorer {
    /// Create a scorer, validating the configuration
    pub fn new(config: ScorerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create a scorer with the given contamination and default forest settings
    pub fn with_contamination(contamination: f64) -> Result<Self> {
        Self::new(ScorerConfig {
            contamination,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Fit on `rows` and label each of them
    ///
    /// Output order matches input order.
    pub fn score(&self, rows: &[AlignedRow]) -> Result<Vec<ScoredRow>> {
        if rows.len() < MIN_ROWS {
            return Err(DetectorError::InsufficientData {
                required: MIN_ROWS,
                got: rows.len(),
            });
        }

        let features: Vec<[f64; 2]> = rows.iter().map(|r| [r.value_a, r.value_b]).collect();
        let forest = IsolationForest::fit(&features, &self.config.forest)?;
        let scores = forest.score_samples(&features);

        let threshold = quantile(&scores, 1.0 - self.config.contamination);

        Ok(rows
            .iter()
            .zip(scores)
            .map(|(row, score)| ScoredRow {
                row: *row,
                label: if score > threshold {
                    Label::Anomalous
                } else {
                    Label::Normal
                },
            })
            .collect())
    }
}

/// Linearly interpolated quantile, `q` in [0, 1]
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
