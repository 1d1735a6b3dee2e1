//! Threshold-crossing edge detection
//!
//! Scans consecutive sample pairs of one window and reports every crossing
//! of the threshold in the requested direction, in time order. No merging
//! or deduplication happens here; reconciliation decides what multiple
//! edges in one window mean.

use serde::{Deserialize, Serialize};

use crate::capture::window::Window;

/// Crossing direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    Rising,
    Falling,
}

impl EdgeDirection {
    /// `x` is on the pre-crossing side of `level`
    fn before(self, x: f64, level: f64) -> bool {
        match self {
            EdgeDirection::Rising => x < level,
            EdgeDirection::Falling => x > level,
        }
    }

    /// `x` has reached or passed `level`
    fn beyond(self, x: f64, level: f64) -> bool {
        match self {
            EdgeDirection::Rising => x >= level,
            EdgeDirection::Falling => x <= level,
        }
    }

    /// Level the signal must pass after an edge before re-arming
    fn settle_level(self, threshold: f64, hysteresis: f64) -> f64 {
        match self {
            EdgeDirection::Rising => threshold + hysteresis,
            EdgeDirection::Falling => threshold - hysteresis,
        }
    }
}

/// How an edge time is placed between the bracketing samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Straight line between the two samples, sub-sample resolution
    #[default]
    Linear,
    /// Time of the last sample before the crossing
    SampleBefore,
    /// Time of whichever bracketing sample is closer to the threshold
    Nearest,
}

/// One detected crossing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Crossing time in seconds
    pub time: f64,
    pub direction: EdgeDirection,
    /// Index of the sample before the crossing within its window
    pub sample_index: usize,
}

/// Threshold crossing detector for one channel
///
/// # Example
/// ```
/// use scopejitter_core::signal::edge::{EdgeDetector, EdgeDirection};
///
/// let detector = EdgeDetector::new(0.5, EdgeDirection::Rising);
/// let time = [0.0, 1.0, 2.0, 3.0];
/// let samples = [0.0, 0.0, 1.0, 1.0];
/// let edges = detector.detect(&time, &samples);
/// assert_eq!(edges.len(), 1);
/// assert!((edges[0].time - 1.5).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeDetector {
    pub threshold: f64,
    pub direction: EdgeDirection,
    #[serde(default)]
    pub interpolation: Interpolation,
    /// Re-arm band; 0 disables hysteresis
    #[serde(default)]
    pub hysteresis: f64,
}

impl EdgeDetector {
    pub fn new(threshold: f64, direction: EdgeDirection) -> Self {
        Self {
            threshold,
            direction,
            interpolation: Interpolation::Linear,
            hysteresis: 0.0,
        }
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Require the signal to pass `threshold ± hysteresis` and return across
    /// the threshold before another edge can register
    ///
    /// Arming uses the same comparisons as plain detection, so a falling edge
    /// registers on `a > threshold && b <= threshold`. Settling and re-arming
    /// are level tests on the latest sample: the signal only has to be at or
    /// past the settle level, then back on the armed side of the threshold.
    /// A detector that arms falling edges on `a >= threshold && b <
    /// threshold` and needs a sample-pair crossing for each transition can
    /// disagree when a sample lands exactly on a level, or when the edge step
    /// itself jumps past the settle level (settled here, still waiting there).
    pub fn with_hysteresis(mut self, hysteresis: f64) -> Self {
        self.hysteresis = hysteresis.abs();
        self
    }

    /// Detect edges over paired time/amplitude slices
    ///
    /// Slices of unequal length are scanned over their common prefix.
    pub fn detect(&self, time: &[f64], samples: &[f64]) -> Vec<Edge> {
        let len = time.len().min(samples.len());
        if len < 2 {
            return Vec::new();
        }
        let edges = if self.hysteresis > 0.0 {
            self.scan_with_hysteresis(&time[..len], &samples[..len])
        } else {
            self.scan(&time[..len], &samples[..len])
        };
        tracing::trace!(
            edges = edges.len(),
            threshold = self.threshold,
            direction = ?self.direction,
            "edges_detected"
        );
        edges
    }

    pub fn detect_window(&self, window: &Window) -> Vec<Edge> {
        self.detect(&window.time, &window.samples)
    }

    /// Edge times only
    pub fn detect_times(&self, window: &Window) -> Vec<f64> {
        self.detect_window(window)
            .into_iter()
            .map(|edge| edge.time)
            .collect()
    }

    fn scan(&self, time: &[f64], samples: &[f64]) -> Vec<Edge> {
        let th = self.threshold;
        samples
            .windows(2)
            .enumerate()
            .filter(|(_, pair)| self.direction.before(pair[0], th) && self.direction.beyond(pair[1], th))
            .map(|(i, _)| self.edge_at(i, time, samples))
            .collect()
    }

    fn scan_with_hysteresis(&self, time: &[f64], samples: &[f64]) -> Vec<Edge> {
        #[derive(Clone, Copy)]
        enum State {
            Armed,
            Triggered,
            Settled,
        }

        let th = self.threshold;
        let settle = self.direction.settle_level(th, self.hysteresis);
        let dir = self.direction;
        let mut state = State::Armed;
        let mut edges = Vec::new();

        for (i, pair) in samples.windows(2).enumerate() {
            let (a, b) = (pair[0], pair[1]);
            state = match state {
                State::Armed if dir.before(a, th) && dir.beyond(b, th) => {
                    edges.push(self.edge_at(i, time, samples));
                    if dir.beyond(b, settle) {
                        State::Settled
                    } else {
                        State::Triggered
                    }
                }
                State::Triggered if dir.beyond(b, settle) => State::Settled,
                State::Settled if dir.before(b, th) => State::Armed,
                unchanged => unchanged,
            };
        }
        edges
    }

    fn edge_at(&self, i: usize, time: &[f64], samples: &[f64]) -> Edge {
        let (t0, t1) = (time[i], time[i + 1]);
        let (a, b) = (samples[i], samples[i + 1]);
        let th = self.threshold;
        let time = match self.interpolation {
            // a and b straddle the threshold, so b != a
            Interpolation::Linear => t0 + (th - a) / (b - a) * (t1 - t0),
            Interpolation::SampleBefore => t0,
            Interpolation::Nearest => {
                if (a - th).abs() <= (b - th).abs() {
                    t0
                } else {
                    t1
                }
            }
        };
        Edge {
            time,
            direction: self.direction,
            sample_index: i,
        }
    }
}

/// Edge times in `window` crossing `threshold` in `direction`, linearly interpolated
pub fn detect_edges(window: &Window, threshold: f64, direction: EdgeDirection) -> Vec<f64> {
    EdgeDetector::new(threshold, direction).detect_times(window)
}
