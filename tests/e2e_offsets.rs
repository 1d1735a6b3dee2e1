//! E2E tests for offset reconciliation and the capture pipeline

use approx::assert_abs_diff_eq;
use scopejitter::pipeline::WindowMode;
use scopejitter::signal::reconcile::{reconcile, MultiEdgeFallback, Reconciliation};
use scopejitter::signal::synth::{SyntheticConfig, SyntheticGenerator};
use scopejitter::{reconcile_offsets, JitterError, OffsetPipeline, PipelineConfig, ReconcileStrategy};

const DELTA: f64 = 10e-9;

/// Equal counts pair one-to-one and yield exactly the delay
#[test]
fn test_equal_counts_yield_delay() {
    let reference = [1.0e-9, 51.0e-9, 101.0e-9];
    let chip: Vec<f64> = reference.iter().map(|t| t + DELTA).collect();
    for handling in [false, true] {
        let offsets = reconcile_offsets(&reference, &chip, handling).unwrap();
        assert_eq!(offsets.len(), 3);
        for offset in offsets {
            assert_abs_diff_eq!(offset, DELTA, epsilon = 1e-18);
        }
    }
}

/// One reference edge against three chip edges collapses to delay plus mean deviation
#[test]
fn test_one_vs_three_collapses() {
    let reference = [20.0e-9];
    let deviations = [-0.3e-9, 0.1e-9, 0.5e-9];
    let chip: Vec<f64> = deviations.iter().map(|d| reference[0] + DELTA + d).collect();

    let offsets = reconcile_offsets(&reference, &chip, true).unwrap();
    let mean_deviation = deviations.iter().sum::<f64>() / 3.0;
    assert_eq!(offsets.len(), 1);
    assert_abs_diff_eq!(offsets[0], DELTA + mean_deviation, epsilon = 1e-18);
}

/// Rejecting reconciliation with unequal counts always fails and emits nothing
#[test]
fn test_reject_unequal_counts() {
    let cases: [(&[f64], &[f64]); 3] = [
        (&[1.0], &[2.0, 3.0]),
        (&[1.0, 2.0], &[]),
        (&[], &[5.0]),
    ];
    for (reference, chip) in cases {
        let err = reconcile_offsets(reference, chip, false).unwrap_err();
        assert_eq!(
            err,
            JitterError::EdgeCountMismatch {
                reference: reference.len(),
                chip: chip.len()
            }
        );
    }
}

/// Multi-edge windows on both sides follow the configured fallback
#[test]
fn test_multi_edge_fallback() {
    let reference = [1.0, 2.0];
    let chip = [1.5, 2.5, 3.5];
    let collapse = ReconcileStrategy::MeanCollapse {
        multi_edge: MultiEdgeFallback::CollapseBoth,
    };
    assert_eq!(
        reconcile(&reference, &chip, collapse).unwrap(),
        Reconciliation::Collapsed(1.0)
    );
    let skip = ReconcileStrategy::MeanCollapse {
        multi_edge: MultiEdgeFallback::Skip,
    };
    assert_eq!(reconcile(&reference, &chip, skip).unwrap(), Reconciliation::Skipped);
    assert_eq!(
        reconcile(&reference, &chip, ReconcileStrategy::ExactPairing).unwrap(),
        Reconciliation::Skipped
    );
}

/// Synthetic captures recover the true per-window offsets
#[test]
fn test_pipeline_matches_ground_truth() {
    let burst = SyntheticGenerator::new(SyntheticConfig {
        windows: 50,
        num_samples: 400,
        ..Default::default()
    })
    .generate();
    let pipeline = OffsetPipeline::new(PipelineConfig::default());
    let result = pipeline.process(&burst.capture).unwrap();

    let truth: Vec<f64> = burst.true_offsets.iter().flatten().copied().collect();
    assert_eq!(result.offsets.len(), truth.len());
    for (got, want) in result.offsets.iter().zip(&truth) {
        assert_abs_diff_eq!(*got, *want, epsilon = 1e-15);
    }
    assert_eq!(result.stats.collapsed, 0);
}

/// Windowed recovery keeps one offset per usable window despite glitches
#[test]
fn test_windowed_recovery_with_glitches() {
    let burst = SyntheticGenerator::new(SyntheticConfig {
        windows: 60,
        num_samples: 300,
        spurious_probability: 0.25,
        dropout_probability: 0.1,
        ..Default::default()
    })
    .generate();
    let dropped = burst.true_offsets.iter().filter(|t| t.is_none()).count();

    let recovering = OffsetPipeline::new(PipelineConfig {
        window_mode: WindowMode::PerWindow,
        ..Default::default()
    });
    let result = recovering.process(&burst.capture).unwrap();
    assert_eq!(result.offsets.len(), 60 - dropped);
    assert_eq!(result.stats.skipped, dropped);
    assert_eq!(result.stats.windows, 60);
    assert_eq!(result.stats.collapsed, burst.glitched_windows.len());

    let strict = OffsetPipeline::new(PipelineConfig {
        strategy: ReconcileStrategy::Reject,
        window_mode: WindowMode::PerWindow,
        ..Default::default()
    });
    if dropped + burst.glitched_windows.len() > 0 {
        assert!(matches!(
            strict.process(&burst.capture),
            Err(JitterError::EdgeCountMismatch { .. })
        ));
    }
}
