//! Periodic anomaly detection
//!
//! The detection loop is the process's only background activity. Each cycle
//! fetches both signals over a trailing window, aligns them, scores the
//! window and records new anomalies. Failures degrade a cycle to "detect
//! nothing"; they never stop the loop.

mod r#loop;

#[cfg(test)]
mod tests;

pub use r#loop::{
    CycleOutcome, CycleReport, DetectionConfig, DetectionLoop, DetectionLoopBuilder,
    DEFAULT_INTERVAL, DEFAULT_WINDOW,
};
