//! Error taxonomy for the offset pipeline
//!
//! Every variant is a data condition attached to one capture or one sweep
//! value. Nothing in the pipeline retries; callers decide via
//! [`JitterError::is_recoverable`].

use thiserror::Error;

/// Errors produced by reconstruction, reconciliation and aggregation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JitterError {
    /// Capture buffer shorter than `N × num_samples` (after any header prefix)
    #[error("Insufficient data: need {needed} samples, capture holds {available}")]
    InsufficientData { needed: usize, available: usize },

    /// Rejecting reconciliation saw unequal edge counts
    #[error("Edge count mismatch: {reference} reference edges, {chip} chip edges")]
    EdgeCountMismatch { reference: usize, chip: usize },

    /// Nothing with usable variance survived the outlier cutoff
    #[error("Degenerate distribution: {retained} offsets retained, no usable variance")]
    DegenerateDistribution { retained: usize },

    /// Reference and chip channels were captured on different time arrays
    #[error("Timebase mismatch: reference has {reference} time points, chip has {chip}")]
    TimebaseMismatch { reference: usize, chip: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl JitterError {
    /// Whether re-acquiring the capture can clear this condition
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            JitterError::InsufficientData { .. }
                | JitterError::EdgeCountMismatch { .. }
                | JitterError::TimebaseMismatch { .. }
        )
    }
}

/// Result alias used across the core crate
pub type Result<T> = std::result::Result<T, JitterError>;
