//! Capture-to-offsets pipeline
//!
//! Runs the four stages over one [`DualCapture`]:
//!
//! ```text
//! raw buffers ─▶ windows ─▶ edges (per channel) ─▶ offsets
//! ```
//!
//! By default the whole signal span is matched first. Only when its edge
//! counts disagree, and the strategy can recover mismatches, is the span
//! split into windows and reconciled window by window.

use serde::{Deserialize, Serialize};

use crate::capture::source::DualCapture;
use crate::capture::window::{HeaderPolicy, Window, WindowReconstructor};
use crate::error::{JitterError, Result};
use crate::signal::edge::{EdgeDetector, EdgeDirection, Interpolation};
use crate::signal::reconcile::{reconcile, ReconcileStats, ReconcileStrategy, Reconciliation};

/// Threshold and slope for one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Threshold in volts
    pub threshold: f64,
    pub direction: EdgeDirection,
    #[serde(default)]
    pub interpolation: Interpolation,
    #[serde(default)]
    pub hysteresis: f64,
}

impl ChannelSettings {
    pub fn new(threshold: f64, direction: EdgeDirection) -> Self {
        Self {
            threshold,
            direction,
            interpolation: Interpolation::default(),
            hysteresis: 0.0,
        }
    }

    /// Rising edge at 80 mV, the AWG reference default
    pub fn reference_default() -> Self {
        Self::new(0.08, EdgeDirection::Rising)
    }

    /// Falling edge at 0 V, the chip output default
    pub fn chip_default() -> Self {
        Self::new(0.0, EdgeDirection::Falling)
    }

    pub fn detector(&self) -> EdgeDetector {
        EdgeDetector::new(self.threshold, self.direction)
            .with_interpolation(self.interpolation)
            .with_hysteresis(self.hysteresis)
    }
}

/// Whether edges are matched per window or across the whole capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    /// Match the whole span; split into windows only to recover a mismatch
    #[default]
    WholeCaptureFirst,
    /// Always reconcile window by window
    PerWindow,
    /// Treat the whole span as a single window
    WholeCapture,
}

/// Pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub reference: ChannelSettings,
    pub chip: ChannelSettings,
    pub header: HeaderPolicy,
    pub strategy: ReconcileStrategy,
    pub window_mode: WindowMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reference: ChannelSettings::reference_default(),
            chip: ChannelSettings::chip_default(),
            header: HeaderPolicy::default(),
            strategy: ReconcileStrategy::default(),
            window_mode: WindowMode::default(),
        }
    }
}

/// Offsets extracted from one capture
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureOffsets {
    pub offsets: Vec<f64>,
    pub stats: ReconcileStats,
}

/// Turns dual-channel captures into offsets
///
/// # Example
/// ```
/// use scopejitter_core::pipeline::{OffsetPipeline, PipelineConfig, ChannelSettings};
/// use scopejitter_core::signal::synth::{SyntheticConfig, SyntheticGenerator};
///
/// let synth = SyntheticConfig { windows: 10, num_samples: 300, ..Default::default() };
/// let burst = SyntheticGenerator::new(synth.clone()).generate();
///
/// let pipeline = OffsetPipeline::new(PipelineConfig {
///     reference: ChannelSettings::reference_default(),
///     chip: ChannelSettings::chip_default(),
///     ..Default::default()
/// });
/// let result = pipeline.process(&burst.capture).unwrap();
/// assert_eq!(result.offsets.len(), 10);
/// ```
#[derive(Debug, Clone)]
pub struct OffsetPipeline {
    config: PipelineConfig,
    reference: EdgeDetector,
    chip: EdgeDetector,
}

impl OffsetPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            reference: config.reference.detector(),
            chip: config.chip.detector(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract offsets from one capture
    ///
    /// # Errors
    /// - `TimebaseMismatch` when the channels were sampled on different times
    /// - `InsufficientData` when the buffers are shorter than the window geometry
    /// - `EdgeCountMismatch` under [`ReconcileStrategy::Reject`] when counts differ
    pub fn process(&self, capture: &DualCapture) -> Result<CaptureOffsets> {
        capture.validate()?;
        let reconstructor = WindowReconstructor::new(
            capture.windows,
            capture.samples_per_window,
            self.config.header,
        )?;

        let result = match self.config.window_mode {
            WindowMode::PerWindow => self.per_window(capture, &reconstructor),
            WindowMode::WholeCapture => self.whole_capture(capture, &reconstructor, true),
            WindowMode::WholeCaptureFirst => {
                match self.whole_capture(capture, &reconstructor, false) {
                    Err(JitterError::EdgeCountMismatch { reference, chip })
                        if self.config.strategy.recovers_mismatches() =>
                    {
                        tracing::debug!(
                            reference,
                            chip,
                            "whole_capture_mismatch_falling_back_to_windows"
                        );
                        self.per_window(capture, &reconstructor)
                    }
                    other => other,
                }
            }
        }?;

        tracing::debug!(
            windows = result.stats.windows,
            offsets = result.offsets.len(),
            paired = result.stats.paired,
            collapsed = result.stats.collapsed,
            skipped = result.stats.skipped,
            whole_capture = result.stats.whole_captures > 0,
            "capture_processed"
        );
        Ok(result)
    }

    /// Match the whole span as one window
    ///
    /// With `apply_strategy` false, unequal counts always fail so the caller
    /// can decide whether to fall back to windows.
    fn whole_capture(
        &self,
        capture: &DualCapture,
        reconstructor: &WindowReconstructor,
        apply_strategy: bool,
    ) -> Result<CaptureOffsets> {
        let ref_span = reconstructor.reconstruct_span(&capture.reference)?;
        let chip_span = reconstructor.reconstruct_span(&capture.chip)?;
        let strategy = if apply_strategy {
            self.config.strategy
        } else {
            ReconcileStrategy::Reject
        };

        let outcome = self.reconcile_window(&ref_span, &chip_span, strategy)?;
        let mut stats = ReconcileStats::default();
        stats.record(&outcome);
        stats.whole_captures = 1;
        Ok(CaptureOffsets {
            offsets: outcome.into_offsets(),
            stats,
        })
    }

    fn per_window(
        &self,
        capture: &DualCapture,
        reconstructor: &WindowReconstructor,
    ) -> Result<CaptureOffsets> {
        let ref_windows = reconstructor.reconstruct(&capture.reference)?;
        let chip_windows = reconstructor.reconstruct(&capture.chip)?;

        let mut result = CaptureOffsets::default();
        for (ref_window, chip_window) in ref_windows.iter().zip(&chip_windows) {
            let outcome = self.reconcile_window(ref_window, chip_window, self.config.strategy)?;
            result.stats.record(&outcome);
            result.offsets.extend_from_slice(outcome.offsets());
        }
        Ok(result)
    }

    fn reconcile_window(
        &self,
        reference: &Window,
        chip: &Window,
        strategy: ReconcileStrategy,
    ) -> Result<Reconciliation> {
        let ref_edges = self.reference.detect_times(reference);
        let chip_edges = self.chip.detect_times(chip);
        tracing::trace!(
            window = reference.index,
            reference_edges = ref_edges.len(),
            chip_edges = chip_edges.len(),
            "window_edges"
        );
        reconcile(&ref_edges, &chip_edges, strategy)
    }
}
