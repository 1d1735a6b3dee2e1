//! Meta-tests that verify test suite integrity
//!
//! These tests ensure that:
//! - No tests are ignored
//! - E2E test files exist
//! - The synthetic source stays a faithful stand-in for the scope

use std::path::{Path, PathBuf};

fn rust_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            rust_files(&path, out);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            out.push(path);
        }
    }
}

/// Verify no tests are ignored in the workspace
///
/// Ignored tests can hide regressions. All tests must run.
#[test]
fn no_ignored_tests() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut files = Vec::new();
    for dir in ["src", "tests", "benches", "crates/scopejitter-core/src"] {
        rust_files(&root.join(dir), &mut files);
    }
    assert!(!files.is_empty(), "no sources found under {}", root.display());

    let marker = concat!("#[", "ignore");
    let offenders: Vec<String> = files
        .iter()
        .filter(|path| {
            std::fs::read_to_string(path)
                .map(|text| text.contains(marker))
                .unwrap_or(false)
        })
        .map(|path| path.display().to_string())
        .collect();

    assert!(
        offenders.is_empty(),
        "Found ignored tests - all tests must run.\nFiles:\n{}",
        offenders.join("\n")
    );
}

/// Verify E2E test files exist and are not empty
#[test]
fn e2e_tests_exist() {
    let test_files = [
        "e2e_reconstruct.rs",
        "e2e_edges.rs",
        "e2e_offsets.rs",
        "e2e_distribution.rs",
        "e2e_sweep.rs",
        "e2e_config.rs",
    ];

    for file in test_files {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join(file);

        assert!(
            path.exists(),
            "Missing E2E test file: {}. All E2E tests must be present.",
            file
        );

        // Check file is not empty
        let metadata = std::fs::metadata(&path).expect("Failed to get file metadata");
        assert!(
            metadata.len() > 100,
            "E2E test file {} appears to be empty or too small ({} bytes)",
            file,
            metadata.len()
        );
    }
}

// ============================================================================
// SYNTHETIC SOURCE INTEGRITY TESTS
// ============================================================================

/// Verify synthetic captures carry the scope's sequence-mode header
#[test]
fn synthetic_header_matches_sequence_prefix() {
    use scopejitter::capture::window::sequence_prefix_len;
    use scopejitter::signal::synth::{SyntheticConfig, SyntheticGenerator};

    for windows in [1, 10, 100] {
        let burst = SyntheticGenerator::new(SyntheticConfig {
            windows,
            num_samples: 300,
            ..Default::default()
        })
        .generate();
        assert_eq!(
            burst.capture.reference.len(),
            sequence_prefix_len(windows) + windows * 300
        );
        assert_eq!(burst.capture.chip.len(), burst.capture.reference.len());
    }
}

/// Verify the synthetic source is deterministic for a seed
#[test]
fn synthetic_source_is_reproducible() {
    use scopejitter::signal::synth::{SyntheticConfig, SyntheticGenerator};

    let config = SyntheticConfig {
        windows: 20,
        num_samples: 300,
        ..Default::default()
    };
    let a = SyntheticGenerator::new(config.clone()).generate();
    let b = SyntheticGenerator::new(config.clone()).generate();
    assert_eq!(a.capture, b.capture);

    let c = SyntheticGenerator::new(SyntheticConfig {
        seed: config.seed + 1,
        ..config
    })
    .generate();
    assert_ne!(a.true_offsets, c.true_offsets);
}

/// Verify the default thresholds sit mid-swing on the synthetic levels
#[test]
fn default_thresholds_match_synthetic_levels() {
    use scopejitter::pipeline::ChannelSettings;
    use scopejitter::signal::synth::SyntheticConfig;

    let synth = SyntheticConfig::default();
    assert_eq!(
        ChannelSettings::reference_default().threshold,
        synth.reference_threshold()
    );
    assert_eq!(ChannelSettings::chip_default().threshold, synth.chip_threshold());
}
