//! Scopejitter - Oscilloscope timing jitter measurement
//!
//! This library re-exports the capture, signal and statistics
//! functionality from `scopejitter-core` and adds the command-line
//! configuration used by the `scopejitter` binary.

pub mod cli;
pub mod config;
pub mod simulate;

pub use scopejitter_core::artifacts;
pub use scopejitter_core::capture;
pub use scopejitter_core::error;
pub use scopejitter_core::pipeline;
pub use scopejitter_core::signal;
pub use scopejitter_core::stats;
pub use scopejitter_core::sweep;

pub use scopejitter_core::{
    aggregate, detect_edges, reconcile_offsets, reconstruct_windows, AggregateConfig,
    CaptureSource, ChannelCapture, DualCapture, EdgeDetector, EdgeDirection, FittedDistribution,
    HeaderPolicy, JitterError, OffsetPipeline, PipelineConfig, ReconcileStrategy, SweepConfig,
    SweepRunner, WindowReconstructor, VERSION,
};
