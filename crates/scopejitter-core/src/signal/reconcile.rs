//! Reference/chip edge reconciliation
//!
//! Turns the edge lists of one window (or of a whole capture) into time
//! offsets, `chip − reference`. Equal counts pair in time order. Unequal
//! counts are handled by the configured [`ReconcileStrategy`].
//!
//! Mean collapse is an approximation: several chip edges against one
//! reference edge are replaced by their centroid. It recovers windows that
//! would otherwise cost a whole capture, at the price of heavy tails in the
//! aggregated offsets when multi-edge windows are common. The counts in
//! [`ReconcileStats`] are what expose that bias downstream.

use serde::{Deserialize, Serialize};

use crate::error::{JitterError, Result};

/// What to do when both sides carry more than one edge and the counts differ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiEdgeFallback {
    /// Collapse each side to its mean time and emit one offset
    #[default]
    CollapseBoth,
    /// Drop the window
    Skip,
}

/// Policy for windows whose edge counts differ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ReconcileStrategy {
    /// Fail the batch with `EdgeCountMismatch`
    Reject,
    /// Recover per window by collapsing surplus edges to their mean
    MeanCollapse {
        #[serde(default)]
        multi_edge: MultiEdgeFallback,
    },
    /// Pair equal counts only; drop mismatched windows silently
    ExactPairing,
}

impl Default for ReconcileStrategy {
    fn default() -> Self {
        ReconcileStrategy::MeanCollapse {
            multi_edge: MultiEdgeFallback::CollapseBoth,
        }
    }
}

impl ReconcileStrategy {
    /// `false` rejects mismatches, `true` recovers them by mean collapse
    pub fn from_mismatch_handling(mismatch_handling: bool) -> Self {
        if mismatch_handling {
            ReconcileStrategy::default()
        } else {
            ReconcileStrategy::Reject
        }
    }

    /// Whether mismatched edge counts can be salvaged window by window
    pub fn recovers_mismatches(&self) -> bool {
        !matches!(self, ReconcileStrategy::Reject)
    }
}

/// Outcome for one window
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// No edges on either side
    Empty,
    /// Equal counts, paired in time order
    Paired(Vec<f64>),
    /// Unequal counts collapsed to one representative offset
    Collapsed(f64),
    /// Unequal counts, window dropped
    Skipped,
}

impl Reconciliation {
    pub fn offsets(&self) -> &[f64] {
        match self {
            Reconciliation::Paired(offsets) => offsets,
            Reconciliation::Collapsed(offset) => std::slice::from_ref(offset),
            Reconciliation::Empty | Reconciliation::Skipped => &[],
        }
    }

    pub fn into_offsets(self) -> Vec<f64> {
        match self {
            Reconciliation::Paired(offsets) => offsets,
            Reconciliation::Collapsed(offset) => vec![offset],
            Reconciliation::Empty | Reconciliation::Skipped => Vec::new(),
        }
    }
}

/// Per-capture tally of which reconciliation rule fired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    /// Windows evaluated
    pub windows: usize,
    pub paired: usize,
    pub collapsed: usize,
    pub skipped: usize,
    pub empty: usize,
    /// Captures whose offsets came from matching the whole span at once
    pub whole_captures: usize,
}

impl ReconcileStats {
    pub fn record(&mut self, outcome: &Reconciliation) {
        self.windows += 1;
        match outcome {
            Reconciliation::Empty => self.empty += 1,
            Reconciliation::Paired(_) => self.paired += 1,
            Reconciliation::Collapsed(_) => self.collapsed += 1,
            Reconciliation::Skipped => self.skipped += 1,
        }
    }

    /// Combine tallies from several captures
    pub fn merge(&mut self, other: &ReconcileStats) {
        self.windows += other.windows;
        self.paired += other.paired;
        self.collapsed += other.collapsed;
        self.skipped += other.skipped;
        self.empty += other.empty;
        self.whole_captures += other.whole_captures;
    }

    /// Share of evaluated windows that went through mean collapse
    pub fn collapse_ratio(&self) -> f64 {
        if self.windows == 0 {
            0.0
        } else {
            self.collapsed as f64 / self.windows as f64
        }
    }
}

/// Reconcile one window's edge times under `strategy`
///
/// # Errors
/// `EdgeCountMismatch` when counts differ and `strategy` is
/// [`ReconcileStrategy::Reject`].
pub fn reconcile(
    reference: &[f64],
    chip: &[f64],
    strategy: ReconcileStrategy,
) -> Result<Reconciliation> {
    let (r, c) = (reference.len(), chip.len());

    if r == c {
        if r == 0 {
            return Ok(Reconciliation::Empty);
        }
        let offsets = sorted(reference)
            .iter()
            .zip(sorted(chip).iter())
            .map(|(ref_time, chip_time)| chip_time - ref_time)
            .collect();
        return Ok(Reconciliation::Paired(offsets));
    }

    match strategy {
        ReconcileStrategy::Reject => Err(JitterError::EdgeCountMismatch {
            reference: r,
            chip: c,
        }),
        ReconcileStrategy::ExactPairing => Ok(Reconciliation::Skipped),
        ReconcileStrategy::MeanCollapse { multi_edge } => {
            if r == 0 || c == 0 {
                return Ok(Reconciliation::Skipped);
            }
            if r > 1 && c > 1 && multi_edge == MultiEdgeFallback::Skip {
                return Ok(Reconciliation::Skipped);
            }
            let offset = mean(chip) - mean(reference);
            tracing::trace!(reference = r, chip = c, offset, "edges_collapsed");
            Ok(Reconciliation::Collapsed(offset))
        }
    }
}

/// Offsets for one window, rejecting (`false`) or recovering (`true`) mismatches
///
/// # Example
/// ```
/// use scopejitter_core::signal::reconcile::reconcile_offsets;
///
/// let offsets = reconcile_offsets(&[1.0e-9], &[3.0e-9], false).unwrap();
/// assert!((offsets[0] - 2.0e-9).abs() < 1e-18);
///
/// assert!(reconcile_offsets(&[1.0e-9], &[2.0e-9, 3.0e-9], false).is_err());
/// ```
pub fn reconcile_offsets(reference: &[f64], chip: &[f64], mismatch_handling: bool) -> Result<Vec<f64>> {
    reconcile(
        reference,
        chip,
        ReconcileStrategy::from_mismatch_handling(mismatch_handling),
    )
    .map(Reconciliation::into_offsets)
}

fn sorted(times: &[f64]) -> Vec<f64> {
    let mut times = times.to_vec();
    times.sort_by(f64::total_cmp);
    times
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const DELTA: f64 = 12.5e-9;

    #[test]
    fn test_equal_counts_single_pair() {
        let offsets = reconcile_offsets(&[100e-9], &[100e-9 + DELTA], false).unwrap();
        assert_eq!(offsets.len(), 1);
        assert_abs_diff_eq!(offsets[0], DELTA, epsilon = 1e-18);
    }

    #[test]
    fn test_equal_counts_pair_in_time_order() {
        let reference = [10e-9, 20e-9, 30e-9];
        let chip = [32e-9, 12e-9, 22e-9];
        let offsets = reconcile_offsets(&reference, &chip, false).unwrap();
        assert_eq!(offsets.len(), 3);
        for offset in offsets {
            assert_abs_diff_eq!(offset, 2e-9, epsilon = 1e-18);
        }
    }

    #[test]
    fn test_no_edges_no_offsets() {
        for handling in [false, true] {
            assert!(reconcile_offsets(&[], &[], handling).unwrap().is_empty());
        }
        assert_eq!(
            reconcile(&[], &[], ReconcileStrategy::Reject).unwrap(),
            Reconciliation::Empty
        );
    }

    #[test]
    fn test_reject_mismatch() {
        let result = reconcile_offsets(&[1e-9], &[2e-9, 3e-9], false);
        assert_eq!(
            result,
            Err(JitterError::EdgeCountMismatch {
                reference: 1,
                chip: 2
            })
        );
        assert!(reconcile_offsets(&[], &[2e-9], false).is_err());
    }

    #[test]
    fn test_collapse_one_against_three() {
        let reference = [50e-9];
        let chip = [50e-9 + DELTA - 1e-9, 50e-9 + DELTA, 50e-9 + DELTA + 4e-9];
        let offsets = reconcile_offsets(&reference, &chip, true).unwrap();
        assert_eq!(offsets.len(), 1);
        // Δ plus the mean deviation of the three chip edges (−1 + 0 + 4) / 3 ns
        assert_abs_diff_eq!(offsets[0], DELTA + 1e-9, epsilon = 1e-18);
    }

    #[test]
    fn test_collapse_many_references_against_one_chip() {
        let offsets = reconcile_offsets(&[1e-9, 3e-9], &[10e-9], true).unwrap();
        assert_abs_diff_eq!(offsets[0], 8e-9, epsilon = 1e-18);
    }

    #[test]
    fn test_zero_side_skipped() {
        let strategy = ReconcileStrategy::default();
        assert_eq!(
            reconcile(&[], &[1e-9, 2e-9], strategy).unwrap(),
            Reconciliation::Skipped
        );
        assert_eq!(
            reconcile(&[1e-9], &[], strategy).unwrap(),
            Reconciliation::Skipped
        );
    }

    #[test]
    fn test_multi_edge_fallbacks() {
        let reference = [0.0, 2e-9];
        let chip = [5e-9, 6e-9, 7e-9];

        let collapsed = reconcile(&reference, &chip, ReconcileStrategy::default()).unwrap();
        match collapsed {
            Reconciliation::Collapsed(offset) => assert_abs_diff_eq!(offset, 5e-9, epsilon = 1e-18),
            other => panic!("expected collapse, got {other:?}"),
        }

        let skipped = reconcile(
            &reference,
            &chip,
            ReconcileStrategy::MeanCollapse {
                multi_edge: MultiEdgeFallback::Skip,
            },
        )
        .unwrap();
        assert_eq!(skipped, Reconciliation::Skipped);
    }

    #[test]
    fn test_exact_pairing_skips_mismatch() {
        let outcome = reconcile(&[1e-9], &[2e-9, 3e-9], ReconcileStrategy::ExactPairing).unwrap();
        assert_eq!(outcome, Reconciliation::Skipped);
        assert!(outcome.offsets().is_empty());
    }

    #[test]
    fn test_stats_tally() {
        let mut stats = ReconcileStats::default();
        stats.record(&Reconciliation::Paired(vec![1.0]));
        stats.record(&Reconciliation::Collapsed(1.0));
        stats.record(&Reconciliation::Skipped);
        stats.record(&Reconciliation::Empty);
        assert_eq!(stats.windows, 4);
        assert_eq!(stats.paired, 1);
        assert_eq!(stats.collapsed, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.empty, 1);
        assert_abs_diff_eq!(stats.collapse_ratio(), 0.25);

        let mut total = ReconcileStats::default();
        total.merge(&stats);
        total.merge(&stats);
        assert_eq!(total.windows, 8);
    }

    #[test]
    fn test_strategy_mapping() {
        assert_eq!(
            ReconcileStrategy::from_mismatch_handling(false),
            ReconcileStrategy::Reject
        );
        assert!(ReconcileStrategy::from_mismatch_handling(true).recovers_mismatches());
        assert!(!ReconcileStrategy::Reject.recovers_mismatches());
    }
}
