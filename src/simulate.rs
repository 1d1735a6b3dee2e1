//! Parameter sweeps against the synthetic signal source
//!
//! Every configured parameter is swept in turn into the same artifact
//! root. The effective settings are recorded once before the first sweep.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use scopejitter_core::artifacts::ArtifactWriter;
use scopejitter_core::pipeline::OffsetPipeline;
use scopejitter_core::signal::synth::SyntheticSource;
use scopejitter_core::sweep::{SweepReport, SweepRunner};

use crate::config::AppConfig;

/// Sweep every parameter of `config.param_list()`
///
/// `values` overrides the sweep values of every parameter. A cancelled
/// sweep ends the run; its partial report is still returned.
pub fn run_simulation(
    config: &AppConfig,
    values: Option<&[i64]>,
    cancel: Arc<AtomicBool>,
) -> Result<Vec<SweepReport>> {
    let params = config.param_list();
    let mut reports = Vec::with_capacity(params.len());

    for (index, param) in params.iter().enumerate() {
        let mut writer = ArtifactWriter::new(&config.output_dir, param.clone())
            .with_context(|| format!("failed to prepare {}", config.output_dir.display()))?;
        if index == 0 {
            writer.write_parameters(config)?;
        }
        let values = values
            .map(<[i64]>::to_vec)
            .unwrap_or_else(|| config.sweep_values_for(param));

        let mut runner = SweepRunner::new(
            SyntheticSource::new(config.synthetic.clone()),
            OffsetPipeline::new(config.pipeline_config()),
            config.sweep_config_for(param),
        )
        .with_cancel_flag(Arc::clone(&cancel));

        info!(
            param = %param,
            values = values.len(),
            loops = config.num_loops,
            output = %config.output_dir.display(),
            "sweep_started"
        );
        let report = runner
            .run(values, &mut writer)
            .with_context(|| format!("sweep of {param} failed"))?;
        let cancelled = report.cancelled;
        reports.push(report);
        if cancelled {
            warn!(param = %param, "Sweep cancelled before all parameters completed");
            break;
        }
    }
    Ok(reports)
}
