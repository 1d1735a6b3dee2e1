//! Synthetic sequence captures
//!
//! Produces reference/chip buffers shaped like a scope sequence readout:
//! a junk header followed by `N` windows, each holding one rising
//! reference edge and one falling chip edge a known delay later, with
//! Gaussian timing jitter. Spurious chip glitches and dropped chip edges
//! can be injected to exercise mismatch handling.

use serde::{Deserialize, Serialize};

use crate::capture::source::{AcquisitionRequest, CaptureSource, ChannelCapture, DualCapture, SourceError};
use crate::capture::window::sequence_prefix_len;

/// Shape of the generated signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Windows per burst
    pub windows: usize,
    /// Points per window
    pub num_samples: usize,
    /// Junk points ahead of the first window; `None` uses the sequence-mode prefix
    pub header_samples: Option<usize>,
    /// Sample period in seconds
    pub sample_period: f64,
    /// Nominal reference edge position within a window, in samples
    pub reference_position: usize,
    /// True chip delay after the reference edge, in seconds
    pub delay: f64,
    /// Standard deviation of the chip edge timing, in seconds
    pub jitter: f64,
    /// 0 % to 100 % transition time of both edges, in seconds
    pub rise_time: f64,
    /// Standard deviation of additive amplitude noise, in volts
    pub noise: f64,
    pub reference_low: f64,
    pub reference_high: f64,
    pub chip_high: f64,
    pub chip_low: f64,
    /// Probability a window's chip channel carries an extra glitch edge
    pub spurious_probability: f64,
    /// Probability a window's chip edge is missing
    pub dropout_probability: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            windows: 100,
            num_samples: 500,
            header_samples: None,
            sample_period: 100e-12,
            reference_position: 100,
            delay: 10e-9,
            jitter: 20e-12,
            rise_time: 400e-12,
            noise: 0.0,
            reference_low: 0.0,
            reference_high: 0.16,
            chip_high: 0.5,
            chip_low: -0.5,
            spurious_probability: 0.0,
            dropout_probability: 0.0,
            seed: 0xDEAD_BEEF,
        }
    }
}

impl SyntheticConfig {
    /// Reference threshold halfway between its levels
    pub fn reference_threshold(&self) -> f64 {
        (self.reference_low + self.reference_high) / 2.0
    }

    /// Chip threshold halfway between its levels
    pub fn chip_threshold(&self) -> f64 {
        (self.chip_high + self.chip_low) / 2.0
    }

    pub fn header_len(&self) -> usize {
        self.header_samples
            .unwrap_or_else(|| sequence_prefix_len(self.windows))
    }
}

/// A generated capture and the offsets it was built from
#[derive(Debug, Clone)]
pub struct SyntheticBurst {
    pub capture: DualCapture,
    /// True offset per window; `None` where the chip edge was dropped
    pub true_offsets: Vec<Option<f64>>,
    /// Windows carrying a glitch edge
    pub glitched_windows: Vec<usize>,
}

/// Deterministic capture generator
///
/// # Example
/// ```
/// use scopejitter_core::signal::synth::{SyntheticConfig, SyntheticGenerator};
///
/// let mut gen = SyntheticGenerator::new(SyntheticConfig {
///     windows: 4,
///     num_samples: 300,
///     ..Default::default()
/// });
/// let burst = gen.generate();
/// assert_eq!(burst.true_offsets.len(), 4);
/// assert_eq!(burst.capture.reference.len(), gen.config().header_len() + 4 * 300);
/// ```
#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    config: SyntheticConfig,
    /// PRNG state
    state: u64,
    /// Spare normal deviate from the last Box-Muller pair
    spare: Option<f64>,
}

impl SyntheticGenerator {
    pub fn new(config: SyntheticConfig) -> Self {
        let state = config.seed;
        Self {
            config,
            state,
            spare: None,
        }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Generate one burst
    pub fn generate(&mut self) -> SyntheticBurst {
        let cfg = self.config.clone();
        let header = cfg.header_len();
        let total = header + cfg.windows * cfg.num_samples;
        let dt = cfg.sample_period;

        let time: Vec<f64> = (0..total).map(|i| i as f64 * dt).collect();
        let mut reference = Vec::with_capacity(total);
        let mut chip = Vec::with_capacity(total);

        for _ in 0..header {
            reference.push(self.uniform() * 4.0 - 2.0);
            chip.push(self.uniform() * 4.0 - 2.0);
        }

        let mut true_offsets = Vec::with_capacity(cfg.windows);
        let mut glitched_windows = Vec::new();

        for w in 0..cfg.windows {
            let start = header + w * cfg.num_samples;
            let window_t0 = start as f64 * dt;
            let t_ref = window_t0 + (cfg.reference_position as f64 + self.uniform()) * dt;
            let offset = cfg.delay + self.gaussian() * cfg.jitter;
            let t_chip = t_ref + offset;

            let dropped = self.uniform() < cfg.dropout_probability;
            let glitch = !dropped && self.uniform() < cfg.spurious_probability;
            // Glitch returns high briefly after the main edge, adding a second falling edge
            let glitch_start = t_chip + 4.0 * cfg.rise_time;
            let glitch_end = glitch_start + 4.0 * cfg.rise_time;

            if glitch {
                glitched_windows.push(w);
            }
            true_offsets.push((!dropped).then_some(offset));

            for &t in &time[start..start + cfg.num_samples] {
                let ref_level = ramp(t, t_ref, cfg.rise_time);
                reference.push(
                    cfg.reference_low
                        + (cfg.reference_high - cfg.reference_low) * ref_level
                        + self.gaussian() * cfg.noise,
                );

                let mut chip_level = if dropped {
                    0.0
                } else {
                    ramp(t, t_chip, cfg.rise_time)
                };
                if glitch {
                    chip_level -= ramp(t, glitch_start, cfg.rise_time)
                        - ramp(t, glitch_end, cfg.rise_time);
                }
                chip.push(
                    cfg.chip_high + (cfg.chip_low - cfg.chip_high) * chip_level
                        + self.gaussian() * cfg.noise,
                );
            }
        }

        tracing::trace!(
            windows = cfg.windows,
            glitched = glitched_windows.len(),
            dropped = true_offsets.iter().filter(|o| o.is_none()).count(),
            "synthetic_burst_generated"
        );

        SyntheticBurst {
            capture: DualCapture {
                reference: ChannelCapture::new(time.clone(), reference),
                chip: ChannelCapture::new(time, chip),
                windows: cfg.windows,
                samples_per_window: cfg.num_samples,
            },
            true_offsets,
            glitched_windows,
        }
    }

    /// 64-bit LCG (Knuth MMIX constants), top 53 bits as a uniform in [0, 1)
    fn uniform(&mut self) -> f64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.state >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Standard normal deviate via Box-Muller
    fn gaussian(&mut self) -> f64 {
        if let Some(spare) = self.spare.take() {
            return spare;
        }
        let u1 = 1.0 - self.uniform(); // (0, 1]
        let u2 = self.uniform();
        let radius = (-2.0 * u1.ln()).sqrt();
        let angle = std::f64::consts::TAU * u2;
        self.spare = Some(radius * angle.sin());
        radius * angle.cos()
    }
}

/// 0 before the edge, 1 after, linear through 0.5 at `edge`
fn ramp(t: f64, edge: f64, rise_time: f64) -> f64 {
    if rise_time <= 0.0 {
        return if t >= edge { 1.0 } else { 0.0 };
    }
    (0.5 + (t - edge) / rise_time).clamp(0.0, 1.0)
}

/// Capture source backed by [`SyntheticGenerator`]
///
/// Window geometry follows each acquisition request.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    generator: SyntheticGenerator,
    last_truth: Vec<Option<f64>>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            generator: SyntheticGenerator::new(config),
            last_truth: Vec::new(),
        }
    }

    /// True offsets of the most recent capture
    pub fn last_truth(&self) -> &[Option<f64>] {
        &self.last_truth
    }
}

impl CaptureSource for SyntheticSource {
    fn acquire(&mut self, request: &AcquisitionRequest) -> Result<DualCapture, SourceError> {
        if request.windows == 0 || request.num_samples <= self.generator.config.reference_position {
            return Err(SourceError::Instrument(format!(
                "cannot synthesize {} windows of {} points",
                request.windows, request.num_samples
            )));
        }
        self.generator.config.windows = request.windows;
        self.generator.config.num_samples = request.num_samples;
        let burst = self.generator.generate();
        self.last_truth = burst.true_offsets;
        Ok(burst.capture)
    }
}
