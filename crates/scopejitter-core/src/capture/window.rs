//! Window reconstruction from a multi-window sequence buffer
//!
//! A sequence capture returns all `N` windows back to back in one buffer,
//! preceded by instrument header content of unknown length. The header is
//! never parsed: [`HeaderPolicy`] names the assumption used to find where
//! the signal starts.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::source::ChannelCapture;
use crate::error::{JitterError, Result};

/// How the signal span is located inside a raw buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HeaderPolicy {
    /// The last `N × num_samples` points are signal; everything before is header.
    ///
    /// Exact only while the header length is constant for a given
    /// acquisition configuration. Nothing checks that.
    #[default]
    TrailingSamples,
    /// Skip exactly `samples` leading points, then take `N × num_samples`.
    FixedPrefix { samples: usize },
}

impl HeaderPolicy {
    /// Prefix used by the scope in sequence mode: 16 points per window plus 32
    pub fn sequence_prefix(windows: usize) -> Self {
        HeaderPolicy::FixedPrefix {
            samples: sequence_prefix_len(windows),
        }
    }
}

/// Header length the scope emits ahead of an `N`-window sequence
pub fn sequence_prefix_len(windows: usize) -> usize {
    windows * 16 + 32
}

/// One reconstructed acquisition window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Position within the burst, 0-based
    pub index: usize,
    pub time: Vec<f64>,
    pub samples: Vec<f64>,
}

impl Window {
    pub fn new(index: usize, time: Vec<f64>, samples: Vec<f64>) -> Self {
        Self {
            index,
            time,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Splits raw channel buffers into `N` equal windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowReconstructor {
    windows: usize,
    num_samples: usize,
    header: HeaderPolicy,
}

impl WindowReconstructor {
    /// Create a reconstructor for `windows` windows of `num_samples` points
    ///
    /// # Errors
    /// `InvalidConfig` when either count is zero or their product overflows.
    pub fn new(windows: usize, num_samples: usize, header: HeaderPolicy) -> Result<Self> {
        if windows == 0 || num_samples == 0 {
            return Err(JitterError::InvalidConfig(format!(
                "window geometry must be non-zero (windows={windows}, num_samples={num_samples})"
            )));
        }
        if windows.checked_mul(num_samples).is_none() {
            return Err(JitterError::InvalidConfig(format!(
                "window geometry overflows (windows={windows}, num_samples={num_samples})"
            )));
        }
        Ok(Self {
            windows,
            num_samples,
            header,
        })
    }

    /// Points the signal span must hold
    pub fn signal_len(&self) -> usize {
        self.windows * self.num_samples
    }

    /// Locate the signal span within a buffer of `len` points
    pub fn signal_span(&self, len: usize) -> Result<Range<usize>> {
        let needed = self.signal_len();
        let start = match self.header {
            HeaderPolicy::TrailingSamples => {
                if len < needed {
                    return Err(JitterError::InsufficientData {
                        needed,
                        available: len,
                    });
                }
                len - needed
            }
            HeaderPolicy::FixedPrefix { samples } => {
                let available = len.saturating_sub(samples);
                if available < needed {
                    return Err(JitterError::InsufficientData {
                        needed: needed + samples,
                        available: len,
                    });
                }
                samples
            }
        };
        tracing::trace!(
            header_samples = start,
            trailing_surplus = len - start - needed,
            "signal_span_located"
        );
        Ok(start..start + needed)
    }

    /// Split a flat sample buffer into `N` windows of `num_samples` points
    pub fn split<'a>(&self, raw: &'a [f64]) -> Result<Vec<&'a [f64]>> {
        let span = self.signal_span(raw.len())?;
        Ok(raw[span].chunks_exact(self.num_samples).collect())
    }

    /// Reconstruct every window of one channel, time and amplitude sliced alike
    pub fn reconstruct(&self, capture: &ChannelCapture) -> Result<Vec<Window>> {
        let span = self.signal_span(capture.len().min(capture.time.len()))?;
        let time = &capture.time[span.clone()];
        let samples = &capture.samples[span];

        let windows: Vec<Window> = time
            .chunks_exact(self.num_samples)
            .zip(samples.chunks_exact(self.num_samples))
            .enumerate()
            .map(|(index, (t, s))| Window::new(index, t.to_vec(), s.to_vec()))
            .collect();

        tracing::debug!(
            windows = windows.len(),
            num_samples = self.num_samples,
            discarded = capture.len() - self.signal_len(),
            "windows_reconstructed"
        );
        Ok(windows)
    }

    /// The full signal span as a single window, for whole-capture matching
    pub fn reconstruct_span(&self, capture: &ChannelCapture) -> Result<Window> {
        let span = self.signal_span(capture.len().min(capture.time.len()))?;
        Ok(Window::new(
            0,
            capture.time[span.clone()].to_vec(),
            capture.samples[span].to_vec(),
        ))
    }
}

/// Split `raw` into `windows` windows of `num_samples` points each
///
/// Keeps only the last `windows × num_samples` points, which silently drops
/// any header in front of them.
///
/// # Example
/// ```
/// use scopejitter_core::capture::window::reconstruct_windows;
///
/// let raw = [9.0, 9.0, 1.0, 2.0, 3.0, 4.0];
/// let windows = reconstruct_windows(&raw, 2, 2).unwrap();
/// assert_eq!(windows, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
/// ```
///
/// # Errors
/// `InsufficientData` when `raw` is shorter than `windows × num_samples`.
pub fn reconstruct_windows(raw: &[f64], windows: usize, num_samples: usize) -> Result<Vec<Vec<f64>>> {
    let reconstructor = WindowReconstructor::new(windows, num_samples, HeaderPolicy::TrailingSamples)?;
    Ok(reconstructor
        .split(raw)?
        .into_iter()
        .map(<[f64]>::to_vec)
        .collect())
}
