//! Scopejitter - Oscilloscope timing jitter measurement
//!
//! Entry point for the command-line tool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use scopejitter::artifacts::{self, PlotStyle};
use scopejitter::cli::{AggregateArgs, AnalyzeArgs, Cli, Command, SimulateArgs};
use scopejitter::config::AppConfig;
use scopejitter::simulate::run_simulation;
use scopejitter::stats::distribution::{aggregate_with, FittedDistribution, OffsetSummary};
use scopejitter::{DualCapture, OffsetPipeline};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let directive = match cli.verbose {
        0 => "scopejitter=info",
        1 => "scopejitter=debug",
        _ => "scopejitter=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .init();

    let config = AppConfig::load(&cli.config);
    config.validate().context("invalid configuration")?;

    match cli.command {
        Command::Analyze(args) => analyze(&config, args),
        Command::Aggregate(args) => aggregate(&config, args),
        Command::Simulate(args) => simulate(config, args),
        Command::InitConfig => config.save(&cli.config),
    }
}

fn analyze(config: &AppConfig, args: AnalyzeArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.capture)
        .with_context(|| format!("failed to read {}", args.capture.display()))?;
    let capture: DualCapture = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a capture file", args.capture.display()))?;

    let pipeline = OffsetPipeline::new(config.pipeline_config());
    let result = pipeline.process(&capture)?;
    let stats = result.stats;
    info!(
        offsets = result.offsets.len(),
        paired = stats.paired,
        collapsed = stats.collapsed,
        skipped = stats.skipped,
        "capture_analyzed"
    );

    match &args.output {
        Some(path) => {
            artifacts::write_offsets(path, &result.offsets)?;
            println!("Wrote {} offsets to {}", result.offsets.len(), path.display());
        }
        None => {
            for offset in &result.offsets {
                println!("{offset:.6e}");
            }
        }
    }

    if let Some(summary) = OffsetSummary::from_offsets(&result.offsets, config.deskew) {
        print_summary(&summary);
    }
    Ok(())
}

fn aggregate(config: &AppConfig, args: AggregateArgs) -> Result<()> {
    let mut offsets = Vec::new();
    for path in &args.files {
        let values = artifacts::read_offsets(path)?;
        info!(path = %path.display(), count = values.len(), "offsets_loaded");
        offsets.extend(values);
    }

    let mut aggregate_config = config.aggregate_config();
    if let Some(cutoff) = args.stdv_cutoff {
        aggregate_config.stdv_cutoff = cutoff;
    }
    if let Some(bins) = args.bins {
        aggregate_config.bins = bins;
    }

    if let Some(summary) = OffsetSummary::from_offsets(&offsets, config.deskew) {
        print_summary(&summary);
    }
    let fit = aggregate_with(&offsets, &aggregate_config)?;
    print_fit(&fit);

    if let Some(path) = &args.histogram {
        let png = artifacts::render_histogram_png(&fit, &PlotStyle::default())?;
        std::fs::write(path, png)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Histogram written to {}", path.display());
    }
    Ok(())
}

fn simulate(mut config: AppConfig, args: SimulateArgs) -> Result<()> {
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(loops) = args.loops {
        config.num_loops = loops;
    }
    if let Some(windows) = args.windows {
        config.windows = windows;
    }
    if let Some(seed) = args.seed {
        config.synthetic.seed = seed;
    }
    if let Some(params) = args.params {
        config.sweep_params = params;
    }
    if let Some(values) = args.values {
        config.sweep_values = Some(values);
    }
    config.validate()?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("failed to install Ctrl+C handler")?;

    let reports = run_simulation(&config, None, cancel)?;

    for report in &reports {
        println!();
        println!(
            "{:>8}  {:>14}  {:>12}  {:>10}",
            report.param_name, "FWHM (ps)", "± (ps)", "retained"
        );
        for entry in &report.entries {
            match (&entry.result, &entry.error) {
                (Some(result), _) => println!(
                    "{:>8}  {:>14.3}  {:>12.3}  {:>10}",
                    entry.value,
                    result.distribution.fwhm * 1e12,
                    result.distribution.fwhm_err() * 1e12,
                    result.distribution.retained_count
                ),
                (None, Some(error)) => println!("{:>8}  failed: {error}", entry.value),
                (None, None) => {}
            }
        }
        if report.cancelled {
            warn!(param = %report.param_name, "Sweep cancelled before all values completed");
        }
    }
    println!("Artifacts written to {}", config.output_dir.display());
    Ok(())
}

fn print_summary(summary: &OffsetSummary) {
    println!(
        "Offsets: {}  mean {:.4} ns (deskewed)  std {:.3} ps",
        summary.count,
        summary.mean * 1e9,
        summary.std_dev * 1e12
    );
}

fn print_fit(fit: &FittedDistribution) {
    println!(
        "Fit: center {:.4} ns  FWHM {:.3} ps  sigma {:.3} ps  retained {}/{} ({} outliers)",
        fit.center * 1e9,
        fit.fwhm * 1e12,
        fit.sigma * 1e12,
        fit.retained_count,
        fit.raw_count,
        fit.outliers_removed()
    );
}
