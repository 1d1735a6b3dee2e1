//! Offset distribution: outlier cutoff, histogram, Gaussian width
//!
//! Binning rule: a fixed number of equal-width bins spanning the retained
//! offsets' `[min, max]`, last bin closed on the right. The bin count comes
//! from [`AggregateConfig`] and should stay fixed across a sweep so
//! histograms remain comparable.
//!
//! The Gaussian is moment-fitted: center is the filtered mean and width is
//! `FWHM = 2·√(2·ln 2)·σ` of the filtered offsets.

use serde::{Deserialize, Serialize};

use crate::error::{JitterError, Result};

/// Histogram bins used when nothing else is configured
pub const DEFAULT_BINS: usize = 30;

/// Aggregation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Keep offsets strictly closer than this many σ to the raw mean; 0
    /// disables filtering
    pub stdv_cutoff: f64,
    /// Number of histogram bins
    pub bins: usize,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            stdv_cutoff: 0.0,
            bins: DEFAULT_BINS,
        }
    }
}

impl AggregateConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.stdv_cutoff.is_finite() || self.stdv_cutoff < 0.0 {
            return Err(JitterError::InvalidConfig(format!(
                "stdv_cutoff must be finite and non-negative, got {}",
                self.stdv_cutoff
            )));
        }
        if self.bins == 0 {
            return Err(JitterError::InvalidConfig(
                "histogram needs at least one bin".into(),
            ));
        }
        Ok(())
    }
}

/// Histogram and Gaussian summary of one offset collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedDistribution {
    /// `bins + 1` ascending edges
    pub bin_edges: Vec<f64>,
    pub bin_counts: Vec<usize>,
    /// Filtered mean
    pub center: f64,
    /// Full width at half maximum, from the filtered σ
    pub fwhm: f64,
    /// Filtered population standard deviation
    pub sigma: f64,
    /// Standard error of `sigma`, `σ/√(2(n−1))` over the retained offsets
    #[serde(default)]
    pub sigma_err: f64,
    /// Peak height of the fitted curve in histogram counts
    pub amplitude: f64,
    pub bin_width: f64,
    /// Offsets surviving the cutoff
    pub retained_count: usize,
    /// Offsets before the cutoff
    pub raw_count: usize,
    pub raw_mean: f64,
    pub raw_sigma: f64,
    pub stdv_cutoff: f64,
}

impl FittedDistribution {
    /// Offsets discarded by the cutoff
    pub fn outliers_removed(&self) -> usize {
        self.raw_count - self.retained_count
    }

    /// Standard error of the FWHM
    pub fn fwhm_err(&self) -> f64 {
        fwhm_from_sigma(self.sigma_err)
    }

    /// Fitted curve at `x`, scaled to histogram counts
    pub fn gaussian_at(&self, x: f64) -> f64 {
        let z = (x - self.center) / self.sigma;
        self.amplitude * (-0.5 * z * z).exp()
    }

    /// Centers of the histogram bins
    pub fn bin_centers(&self) -> Vec<f64> {
        self.bin_edges
            .windows(2)
            .map(|pair| 0.5 * (pair[0] + pair[1]))
            .collect()
    }
}

/// `2·√(2·ln 2)·σ`
pub fn fwhm_from_sigma(sigma: f64) -> f64 {
    2.0 * (2.0 * std::f64::consts::LN_2).sqrt() * sigma
}

/// Standard error of a standard deviation estimated from `count` samples
///
/// Zero when fewer than two samples leave nothing to estimate from.
pub fn sigma_standard_error(sigma: f64, count: usize) -> f64 {
    if count < 2 {
        return 0.0;
    }
    sigma / (2.0 * (count - 1) as f64).sqrt()
}

/// Mean and population standard deviation; `None` for an empty slice
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

/// Aggregate with [`DEFAULT_BINS`] bins
///
/// # Example
/// ```
/// use scopejitter_core::stats::distribution::{aggregate, fwhm_from_sigma};
///
/// let offsets = [1.0e-9, 1.1e-9, 0.9e-9, 1.05e-9, 0.95e-9];
/// let fit = aggregate(&offsets, 0.0).unwrap();
/// assert_eq!(fit.retained_count, 5);
/// assert_eq!(fit.fwhm, fwhm_from_sigma(fit.sigma));
/// ```
pub fn aggregate(offsets: &[f64], stdv_cutoff: f64) -> Result<FittedDistribution> {
    aggregate_with(
        offsets,
        &AggregateConfig {
            stdv_cutoff,
            ..Default::default()
        },
    )
}

/// Filter, bin and fit `offsets`
///
/// # Errors
/// `DegenerateDistribution` when nothing survives the cutoff, when the
/// survivors have zero variance, or when an offset is not finite.
/// `InvalidConfig` for a negative cutoff or zero bins.
pub fn aggregate_with(offsets: &[f64], config: &AggregateConfig) -> Result<FittedDistribution> {
    config.validate()?;
    if offsets.iter().any(|v| !v.is_finite()) {
        return Err(JitterError::DegenerateDistribution { retained: 0 });
    }
    let (raw_mean, raw_sigma) =
        mean_std(offsets).ok_or(JitterError::DegenerateDistribution { retained: 0 })?;

    let retained: Vec<f64> = if config.stdv_cutoff > 0.0 {
        let limit = config.stdv_cutoff * raw_sigma;
        offsets
            .iter()
            .copied()
            .filter(|v| (v - raw_mean).abs() < limit)
            .collect()
    } else {
        offsets.to_vec()
    };

    let (center, sigma) =
        mean_std(&retained).ok_or(JitterError::DegenerateDistribution { retained: 0 })?;
    if sigma <= 0.0 {
        return Err(JitterError::DegenerateDistribution {
            retained: retained.len(),
        });
    }

    let (bin_edges, bin_counts) = histogram(&retained, config.bins);
    let bin_width = bin_edges[1] - bin_edges[0];
    // Rounding can leave a tiny σ on identical values
    if bin_width <= 0.0 {
        return Err(JitterError::DegenerateDistribution {
            retained: retained.len(),
        });
    }
    let amplitude =
        retained.len() as f64 * bin_width / (sigma * (2.0 * std::f64::consts::PI).sqrt());

    let fit = FittedDistribution {
        bin_edges,
        bin_counts,
        center,
        fwhm: fwhm_from_sigma(sigma),
        sigma,
        sigma_err: sigma_standard_error(sigma, retained.len()),
        amplitude,
        bin_width,
        retained_count: retained.len(),
        raw_count: offsets.len(),
        raw_mean,
        raw_sigma,
        stdv_cutoff: config.stdv_cutoff,
    };

    tracing::debug!(
        raw = fit.raw_count,
        retained = fit.retained_count,
        removed = fit.outliers_removed(),
        center = fit.center,
        fwhm = fit.fwhm,
        sigma_err = fit.sigma_err,
        "distribution_fitted"
    );
    Ok(fit)
}

/// Equal-width histogram over `[min, max]`; `values` must have a spread
fn histogram(values: &[f64], bins: usize) -> (Vec<f64>, Vec<usize>) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (max - min) / bins as f64;

    let mut edges: Vec<f64> = (0..=bins).map(|i| min + i as f64 * width).collect();
    edges[bins] = max;

    let mut counts = vec![0usize; bins];
    for &v in values {
        let index = (((v - min) / width) as usize).min(bins - 1);
        counts[index] += 1;
    }
    (edges, counts)
}

/// Mean/σ report for a raw offset collection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetSummary {
    pub count: usize,
    /// Mean with the channel deskew added back
    pub mean: f64,
    pub std_dev: f64,
}

impl OffsetSummary {
    /// Summarize `offsets`, adding `deskew` (seconds) to the mean
    ///
    /// The scope delays the reference channel by `deskew` during
    /// acquisition, so measured offsets are short by that amount.
    pub fn from_offsets(offsets: &[f64], deskew: f64) -> Option<Self> {
        let (mean, std_dev) = mean_std(offsets)?;
        Some(Self {
            count: offsets.len(),
            mean: mean + deskew,
            std_dev,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn spread(n: usize) -> Vec<f64> {
        // Deterministic, roughly bell-shaped around 10 ns
        (0..n)
            .map(|i| {
                let x = (i as f64 / n as f64) * 2.0 - 1.0;
                10e-9 + x * x * x * 50e-12
            })
            .collect()
    }

    #[test]
    fn test_fwhm_matches_filtered_sigma() {
        let offsets = spread(500);
        for cutoff in [0.0, 1.0, 2.5] {
            let fit = aggregate(&offsets, cutoff).unwrap();
            assert_eq!(fit.fwhm, fwhm_from_sigma(fit.sigma));
            assert_abs_diff_eq!(fit.fwhm / fit.sigma, 2.354_820_045, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_counts_sum_to_retained() {
        let mut offsets = spread(300);
        offsets.push(1e-6);
        let fit = aggregate_with(
            &offsets,
            &AggregateConfig {
                stdv_cutoff: 3.0,
                bins: 17,
            },
        )
        .unwrap();
        assert_eq!(fit.bin_counts.len(), 17);
        assert_eq!(fit.bin_edges.len(), 18);
        assert_eq!(fit.bin_counts.iter().sum::<usize>(), fit.retained_count);
    }

    #[test]
    fn test_cutoff_drops_outlier() {
        let mut offsets = spread(200);
        offsets.push(5e-6);
        let unfiltered = aggregate(&offsets, 0.0).unwrap();
        assert_eq!(unfiltered.retained_count, 201);
        assert_eq!(unfiltered.outliers_removed(), 0);

        let filtered = aggregate(&offsets, 5.0).unwrap();
        assert_eq!(filtered.retained_count, 200);
        assert_eq!(filtered.outliers_removed(), 1);
        assert!(filtered.sigma < unfiltered.sigma);
        assert_abs_diff_eq!(filtered.center, 10e-9, epsilon = 1e-12);
    }

    #[test]
    fn test_retained_count_monotonic_in_cutoff() {
        let mut offsets = spread(400);
        offsets.extend([3e-9, 20e-9, 40e-9, -5e-9]);
        let mut previous = 0;
        for step in 1..40 {
            let cutoff = step as f64 * 0.25;
            let retained = match aggregate(&offsets, cutoff) {
                Ok(fit) => fit.retained_count,
                Err(JitterError::DegenerateDistribution { retained }) => retained,
                Err(other) => panic!("unexpected error {other}"),
            };
            assert!(retained >= previous, "cutoff {cutoff}: {retained} < {previous}");
            previous = retained;
        }
        let all = aggregate(&offsets, 0.0).unwrap();
        assert_eq!(all.retained_count, offsets.len());
        assert!(all.retained_count >= previous);
    }

    #[test]
    fn test_degenerate_cases() {
        assert_eq!(
            aggregate(&[], 0.0),
            Err(JitterError::DegenerateDistribution { retained: 0 })
        );
        assert_eq!(
            aggregate(&[0.25; 10], 0.0),
            Err(JitterError::DegenerateDistribution { retained: 10 })
        );
        // Two points sit exactly 1σ out; a 0.5σ cutoff keeps neither
        assert_eq!(
            aggregate(&[0.0, 1.0], 0.5),
            Err(JitterError::DegenerateDistribution { retained: 0 })
        );
        // Constant input has σ = 0, so any cutoff keeps nothing
        assert_eq!(
            aggregate(&[0.25; 10], 2.0),
            Err(JitterError::DegenerateDistribution { retained: 0 })
        );
        assert!(matches!(
            aggregate(&[1.0, f64::NAN], 0.0),
            Err(JitterError::DegenerateDistribution { .. })
        ));
    }

    #[test]
    fn test_cutoff_boundary_is_exclusive() {
        // Both points sit exactly 1σ from the mean
        assert_eq!(
            aggregate(&[0.0, 1.0], 1.0),
            Err(JitterError::DegenerateDistribution { retained: 0 })
        );

        // mean 0, σ 1: the ±2 points sit exactly 2σ out
        let offsets = [-2.0, -1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0];
        assert_eq!(mean_std(&offsets), Some((0.0, 1.0)));
        let fit = aggregate(&offsets, 2.0).unwrap();
        assert_eq!(fit.retained_count, 8);
        assert_eq!(fit.outliers_removed(), 2);
        assert_eq!(fit.bin_edges.first(), Some(&-1.0));
        assert_eq!(fit.bin_edges.last(), Some(&1.0));

        assert_eq!(aggregate(&offsets, 2.5).unwrap().retained_count, 10);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            aggregate(&[1.0, 2.0], -1.0),
            Err(JitterError::InvalidConfig(_))
        ));
        assert!(matches!(
            aggregate_with(&[1.0, 2.0], &AggregateConfig { stdv_cutoff: 0.0, bins: 0 }),
            Err(JitterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_histogram_edges_span_data() {
        let fit = aggregate_with(
            &[1.0, 2.0, 2.0, 3.0, 4.0],
            &AggregateConfig {
                stdv_cutoff: 0.0,
                bins: 3,
            },
        )
        .unwrap();
        assert_eq!(fit.bin_edges, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(fit.bin_counts, vec![1, 2, 2]);
        assert_abs_diff_eq!(fit.bin_width, 1.0);
        assert_eq!(fit.bin_centers(), vec![1.5, 2.5, 3.5]);
    }

    #[test]
    fn test_gaussian_peak_at_center() {
        let fit = aggregate(&spread(100), 0.0).unwrap();
        assert_abs_diff_eq!(fit.gaussian_at(fit.center), fit.amplitude);
        assert!(fit.gaussian_at(fit.center + fit.fwhm / 2.0) < fit.amplitude);
        assert_abs_diff_eq!(
            fit.gaussian_at(fit.center + fit.fwhm / 2.0),
            fit.amplitude / 2.0,
            epsilon = 1e-9 * fit.amplitude
        );
    }

    #[test]
    fn test_sigma_error_shrinks_with_count() {
        assert_eq!(sigma_standard_error(1.0, 0), 0.0);
        assert_eq!(sigma_standard_error(1.0, 1), 0.0);
        assert_abs_diff_eq!(sigma_standard_error(2.0, 3), 1.0);

        let small = aggregate(&spread(50), 0.0).unwrap();
        let large = aggregate(&spread(5000), 0.0).unwrap();
        assert_abs_diff_eq!(
            small.sigma_err,
            small.sigma / (2.0 * 49.0_f64).sqrt(),
            epsilon = 1e-24
        );
        assert!(large.sigma_err < small.sigma_err);
        assert_eq!(large.fwhm_err(), fwhm_from_sigma(large.sigma_err));
    }

    #[test]
    fn test_summary_adds_deskew() {
        let summary = OffsetSummary::from_offsets(&[1e-9, 3e-9], 30e-9).unwrap();
        assert_eq!(summary.count, 2);
        assert_abs_diff_eq!(summary.mean, 32e-9, epsilon = 1e-18);
        assert_abs_diff_eq!(summary.std_dev, 1e-9, epsilon = 1e-18);
        assert!(OffsetSummary::from_offsets(&[], 0.0).is_none());
    }
}
