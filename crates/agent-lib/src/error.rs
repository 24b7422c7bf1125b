//! Error taxonomy for the detection pipeline
//!
//! Every variant except `InvalidConfig` is recoverable inside the detection
//! loop: the cycle is skipped or the affected anomaly is dropped, and the loop
//! carries on at its normal cadence.

use thiserror::Error;

/// Errors raised by the detection pipeline and its collaborators
#[derive(Debug, Error)]
pub enum DetectorError {
    /// Network or query failure against the metric source
    #[error("Metric source unavailable: {0}")]
    SourceUnavailable(String),

    /// One of the two signals returned no samples for the window
    #[error("No data available for the requested window")]
    NoData,

    /// Too few aligned rows to fit a model
    #[error("Insufficient data: required {required}, got {got}")]
    InsufficientData { required: usize, got: usize },

    /// The window could not be fitted (degenerate or non-finite features)
    #[error("Model fit failed: {0}")]
    ModelFit(String),

    /// An anomaly record could not be persisted
    #[error("Store write failed: {0}")]
    StoreWrite(String),

    /// The anomaly store could not be read
    #[error("Store read failed: {0}")]
    StoreRead(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {name} - {reason}")]
    InvalidConfig { name: String, reason: String },
}

impl DetectorError {
    pub fn invalid_config(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error means "skip the current cycle"
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            DetectorError::SourceUnavailable(_)
                | DetectorError::NoData
                | DetectorError::InsufficientData { .. }
                | DetectorError::ModelFit(_)
        )
    }

    /// Short machine-friendly label, used for log fields and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            DetectorError::SourceUnavailable(_) => "source_unavailable",
            DetectorError::NoData => "no_data",
            DetectorError::InsufficientData { .. } => "insufficient_data",
            DetectorError::ModelFit(_) => "model_fit",
            DetectorError::StoreWrite(_) => "store_write",
            DetectorError::StoreRead(_) => "store_read",
            DetectorError::InvalidConfig { .. } => "invalid_config",
        }
    }
}

/// Result type for detection operations
pub type Result<T> = std::result::Result<T, DetectorError>;
