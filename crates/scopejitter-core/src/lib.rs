//! Scopejitter Core - Timing jitter from dual-channel sequence captures
//!
//! Measures the delay between a reference signal and a device-under-test
//! signal across thousands of oscilloscope sequence windows, then
//! summarizes the spread of that delay as a histogram and a Gaussian width
//! (FWHM). Captures are reconstructed into windows, threshold crossings are
//! located per channel, crossings are paired into per-window offsets, and
//! the offsets of many capture loops are aggregated.

pub mod artifacts;
pub mod capture;
pub mod error;
pub mod pipeline;
pub mod signal;
pub mod stats;
pub mod sweep;

pub use capture::source::{CaptureSource, ChannelCapture, DualCapture};
pub use capture::window::{reconstruct_windows, HeaderPolicy, WindowReconstructor};
pub use error::{JitterError, Result};
pub use pipeline::{OffsetPipeline, PipelineConfig};
pub use signal::edge::{detect_edges, EdgeDetector, EdgeDirection};
pub use signal::reconcile::{reconcile_offsets, ReconcileStrategy};
pub use stats::distribution::{aggregate, AggregateConfig, FittedDistribution};
pub use sweep::{SweepConfig, SweepRunner};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
