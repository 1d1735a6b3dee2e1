//! Raw capture records and the instrument boundary
//!
//! The instrument connection layer lives outside this crate. It hands the
//! pipeline a [`DualCapture`] through the [`CaptureSource`] trait: one
//! flat buffer per channel covering every window of a sequence burst,
//! header included.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{JitterError, Result};

/// Raw sample buffer for one scope channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelCapture {
    /// Sample times in seconds
    pub time: Vec<f64>,
    /// Amplitudes in volts
    pub samples: Vec<f64>,
}

impl ChannelCapture {
    pub fn new(time: Vec<f64>, samples: Vec<f64>) -> Self {
        Self { time, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Reference and chip buffers from one triggered sequence burst
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DualCapture {
    /// Reference (AWG) channel
    pub reference: ChannelCapture,
    /// Device-under-test channel
    pub chip: ChannelCapture,
    /// Windows in the burst (`N`)
    pub windows: usize,
    /// Points per window as reported by the instrument
    pub samples_per_window: usize,
}

impl DualCapture {
    /// Check both channels share one timebase
    ///
    /// Each channel's time array must match its sample array in length,
    /// and the two channels must have been sampled on identical times.
    pub fn validate(&self) -> Result<()> {
        for (name, channel) in [("reference", &self.reference), ("chip", &self.chip)] {
            if channel.time.len() != channel.samples.len() {
                return Err(JitterError::InvalidConfig(format!(
                    "{name} channel has {} time points for {} samples",
                    channel.time.len(),
                    channel.samples.len()
                )));
            }
        }
        if self.reference.time != self.chip.time {
            return Err(JitterError::TimebaseMismatch {
                reference: self.reference.time.len(),
                chip: self.chip.time.len(),
            });
        }
        Ok(())
    }
}

/// What the sweep asks the instrument for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionRequest {
    /// Windows per sequence burst
    pub windows: usize,
    /// Requested points per window (the instrument may adjust it)
    pub num_samples: usize,
}

/// Failures reported by a capture source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Capture source exhausted")]
    Exhausted,
}

/// Anything that can produce sequence captures on demand
///
/// Implementations may block for as long as the instrument takes.
pub trait CaptureSource {
    fn acquire(
        &mut self,
        request: &AcquisitionRequest,
    ) -> std::result::Result<DualCapture, SourceError>;
}

/// In-memory source replaying queued captures, for tests and playback
#[derive(Debug, Default)]
pub struct ManualSource {
    queue: VecDeque<std::result::Result<DualCapture, SourceError>>,
    served: usize,
}

impl ManualSource {
    pub fn new(captures: impl IntoIterator<Item = DualCapture>) -> Self {
        Self {
            queue: captures.into_iter().map(Ok).collect(),
            served: 0,
        }
    }

    /// Queue a capture or an instrument failure
    pub fn push(&mut self, item: std::result::Result<DualCapture, SourceError>) {
        self.queue.push_back(item);
    }

    /// Number of `acquire` calls answered so far
    pub fn served(&self) -> usize {
        self.served
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl CaptureSource for ManualSource {
    fn acquire(
        &mut self,
        _request: &AcquisitionRequest,
    ) -> std::result::Result<DualCapture, SourceError> {
        let next = self.queue.pop_front().unwrap_or(Err(SourceError::Exhausted));
        self.served += 1;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(len: usize) -> ChannelCapture {
        ChannelCapture::new((0..len).map(|i| i as f64).collect(), vec![0.0; len])
    }

    #[test]
    fn test_validate_matching_timebase() {
        let capture = DualCapture {
            reference: channel(8),
            chip: channel(8),
            windows: 2,
            samples_per_window: 4,
        };
        assert!(capture.validate().is_ok());
    }

    #[test]
    fn test_validate_timebase_mismatch() {
        let capture = DualCapture {
            reference: channel(8),
            chip: channel(6),
            windows: 2,
            samples_per_window: 3,
        };
        assert_eq!(
            capture.validate(),
            Err(JitterError::TimebaseMismatch {
                reference: 8,
                chip: 6
            })
        );
    }

    #[test]
    fn test_validate_ragged_channel() {
        let mut reference = channel(8);
        reference.samples.pop();
        let capture = DualCapture {
            reference,
            chip: channel(8),
            windows: 1,
            samples_per_window: 8,
        };
        assert!(matches!(
            capture.validate(),
            Err(JitterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_manual_source_drains_then_exhausts() {
        let request = AcquisitionRequest {
            windows: 1,
            num_samples: 4,
        };
        let mut source = ManualSource::new(vec![DualCapture::default()]);
        source.push(Err(SourceError::Instrument("timeout".into())));

        assert!(source.acquire(&request).is_ok());
        assert_eq!(
            source.acquire(&request),
            Err(SourceError::Instrument("timeout".into()))
        );
        assert_eq!(source.acquire(&request), Err(SourceError::Exhausted));
        assert_eq!(source.served(), 3);
        assert_eq!(source.remaining(), 0);
    }
}
