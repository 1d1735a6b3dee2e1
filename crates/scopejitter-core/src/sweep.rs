//! Capture loops per sweep value
//!
//! For every value of the swept device parameter the runner pulls
//! `num_loops` sequence captures, turns each into offsets, and aggregates
//! the lot once the loops are done. Recoverable capture failures
//! (`InsufficientData`, `EdgeCountMismatch`, `TimebaseMismatch`) discard
//! the capture and re-acquire; `DegenerateDistribution` ends that sweep
//! value only.
//!
//! Loops run one after another and share nothing but the offset
//! collection. Cancellation is checked before each acquisition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifacts::ArtifactError;
use crate::capture::source::{AcquisitionRequest, CaptureSource, SourceError};
use crate::error::JitterError;
use crate::pipeline::OffsetPipeline;
use crate::signal::reconcile::ReconcileStats;
use crate::stats::collection::OffsetCollection;
use crate::stats::distribution::{AggregateConfig, FittedDistribution, OffsetSummary};

/// Errors ending one sweep value
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Capture source failed: {0}")]
    Source(#[from] SourceError),

    #[error("Pipeline error: {0}")]
    Pipeline(JitterError),

    #[error("Loop {loop_index} gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        loop_index: usize,
        attempts: usize,
        last: JitterError,
    },

    #[error("Distribution fit failed: {0}")]
    Distribution(JitterError),

    #[error("Cancelled after {completed_loops} loops")]
    Cancelled { completed_loops: usize },

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}

/// Loop and aggregation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Name of the swept device parameter, used in artifact names
    pub param_name: String,
    /// Windows per sequence capture (`N`)
    pub windows: usize,
    /// Requested points per window
    pub num_samples: usize,
    /// Captures per sweep value
    pub num_loops: usize,
    /// Re-acquisitions allowed per loop before giving up
    pub max_retries: usize,
    pub aggregate: AggregateConfig,
    /// Reference channel deskew in seconds, added back in summaries
    pub deskew: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            param_name: "param".into(),
            windows: 5000,
            num_samples: 500,
            num_loops: 10,
            max_retries: 20,
            aggregate: AggregateConfig::default(),
            deskew: 30e-9,
        }
    }
}

impl SweepConfig {
    pub fn request(&self) -> AcquisitionRequest {
        AcquisitionRequest {
            windows: self.windows,
            num_samples: self.num_samples,
        }
    }
}

/// Outcome of a completed sweep value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPointResult {
    pub value: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub loops: usize,
    /// Captures thrown away and re-acquired
    pub discarded_captures: usize,
    pub reconcile: ReconcileStats,
    pub summary: Option<OffsetSummary>,
    pub distribution: FittedDistribution,
}

/// One sweep value in a report, fitted or failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepEntry {
    pub value: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SweepPointResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Results across all sweep values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub param_name: String,
    pub entries: Vec<SweepEntry>,
    pub cancelled: bool,
}

/// Jitter of one fitted sweep value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JitterPoint {
    pub value: i64,
    pub sigma: f64,
    pub sigma_err: f64,
    pub fwhm: f64,
    pub fwhm_err: f64,
}

impl SweepReport {
    /// Jitter with its standard error for every fitted value, in sweep order
    pub fn jitter_series(&self) -> Vec<JitterPoint> {
        self.entries
            .iter()
            .filter_map(|e| {
                e.result.as_ref().map(|r| JitterPoint {
                    value: e.value,
                    sigma: r.distribution.sigma,
                    sigma_err: r.distribution.sigma_err,
                    fwhm: r.distribution.fwhm,
                    fwhm_err: r.distribution.fwhm_err(),
                })
            })
            .collect()
    }

    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| e.error.is_some()).count()
    }
}

/// Hooks for persisting loop and sweep-value output
pub trait SweepObserver {
    /// Called before the first acquisition of a sweep value
    fn point_started(&mut self, _value: i64) -> Result<(), SweepError> {
        Ok(())
    }

    fn loop_completed(
        &mut self,
        _value: i64,
        _loop_index: usize,
        _offsets: &[f64],
    ) -> Result<(), SweepError> {
        Ok(())
    }

    fn point_completed(&mut self, _result: &SweepPointResult) -> Result<(), SweepError> {
        Ok(())
    }

    /// Called when a sweep value ends without a fit, cancellation included
    fn point_failed(&mut self, _value: i64, _error: &SweepError) -> Result<(), SweepError> {
        Ok(())
    }

    fn sweep_completed(&mut self, _report: &SweepReport) -> Result<(), SweepError> {
        Ok(())
    }
}

/// Observer that keeps nothing
impl SweepObserver for () {}

/// Drives capture loops against a [`CaptureSource`]
pub struct SweepRunner<S: CaptureSource> {
    source: S,
    pipeline: OffsetPipeline,
    config: SweepConfig,
    cancel: Arc<AtomicBool>,
}

impl<S: CaptureSource> SweepRunner<S> {
    pub fn new(source: S, pipeline: OffsetPipeline, config: SweepConfig) -> Self {
        Self {
            source,
            pipeline,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned cancel flag (e.g. set from a Ctrl+C handler)
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Run every loop for one sweep value and fit the result
    ///
    /// The observer sees `point_started` first, then either
    /// `point_completed` or `point_failed`.
    pub fn run_point(
        &mut self,
        value: i64,
        observer: &mut dyn SweepObserver,
    ) -> Result<SweepPointResult, SweepError> {
        observer.point_started(value)?;
        let outcome = self.collect_point(value, observer);
        if let Err(err) = &outcome {
            if let Err(cleanup) = observer.point_failed(value, err) {
                tracing::warn!(value, error = %cleanup, "point_cleanup_failed");
            }
        }
        outcome
    }

    fn collect_point(
        &mut self,
        value: i64,
        observer: &mut dyn SweepObserver,
    ) -> Result<SweepPointResult, SweepError> {
        let started_at = Utc::now();
        let request = self.config.request();
        let mut collection = OffsetCollection::new();
        let mut discarded_captures = 0;

        for loop_index in 0..self.config.num_loops {
            let mut attempts = 0;
            loop {
                if self.is_cancelled() {
                    tracing::info!(value, loop_index, "sweep_cancelled");
                    return Err(SweepError::Cancelled {
                        completed_loops: loop_index,
                    });
                }
                attempts += 1;
                let capture = self.source.acquire(&request)?;

                match self.pipeline.process(&capture) {
                    Ok(result) => {
                        observer.loop_completed(value, loop_index, &result.offsets)?;
                        collection.add_loop(&result.offsets, &result.stats);
                        tracing::info!(
                            param = %self.config.param_name,
                            value,
                            loop_index,
                            offsets = result.offsets.len(),
                            collapsed = result.stats.collapsed,
                            "loop_completed"
                        );
                        break;
                    }
                    Err(err) if err.is_recoverable() => {
                        discarded_captures += 1;
                        tracing::warn!(
                            value,
                            loop_index,
                            attempts,
                            error = %err,
                            "capture_discarded"
                        );
                        if attempts > self.config.max_retries {
                            return Err(SweepError::RetriesExhausted {
                                loop_index,
                                attempts,
                                last: err,
                            });
                        }
                    }
                    Err(err) => return Err(SweepError::Pipeline(err)),
                }
            }
        }

        let loops = collection.loops();
        let reconcile = *collection.reconcile_stats();
        let summary = collection.summary(self.config.deskew);
        tracing::info!(
            value,
            offsets = collection.len(),
            collapse_ratio = reconcile.collapse_ratio(),
            "sweep_value_collected"
        );
        let distribution = collection
            .aggregate(&self.config.aggregate)
            .map_err(SweepError::Distribution)?;

        let result = SweepPointResult {
            value,
            started_at,
            finished_at: Utc::now(),
            loops,
            discarded_captures,
            reconcile,
            summary,
            distribution,
        };
        observer.point_completed(&result)?;
        Ok(result)
    }

    /// Run every sweep value in order
    ///
    /// A failed value is recorded and the sweep moves on. Cancellation or an
    /// exhausted source ends the sweep.
    pub fn run(
        &mut self,
        values: impl IntoIterator<Item = i64>,
        observer: &mut dyn SweepObserver,
    ) -> Result<SweepReport, SweepError> {
        let mut report = SweepReport {
            param_name: self.config.param_name.clone(),
            ..Default::default()
        };

        for value in values {
            match self.run_point(value, observer) {
                Ok(result) => {
                    tracing::info!(
                        value,
                        fwhm = result.distribution.fwhm,
                        retained = result.distribution.retained_count,
                        "sweep_value_fitted"
                    );
                    report.entries.push(SweepEntry {
                        value,
                        result: Some(result),
                        error: None,
                    });
                }
                Err(SweepError::Cancelled { .. }) => {
                    report.cancelled = true;
                    break;
                }
                Err(err) => {
                    tracing::error!(value, error = %err, "sweep_value_failed");
                    let stop = matches!(err, SweepError::Source(SourceError::Exhausted));
                    report.entries.push(SweepEntry {
                        value,
                        result: None,
                        error: Some(err.to_string()),
                    });
                    if stop {
                        break;
                    }
                }
            }
        }

        observer.sweep_completed(&report)?;
        Ok(report)
    }
}
