//! Persistent experiment configuration
//!
//! Stores acquisition geometry, channel thresholds, aggregation settings and
//! the swept parameters in a JSON file. Missing fields take the defaults of
//! the bench setup.

use std::path::{Path, PathBuf};

use scopejitter_core::capture::window::HeaderPolicy;
use scopejitter_core::pipeline::{ChannelSettings, PipelineConfig, WindowMode};
use scopejitter_core::signal::reconcile::ReconcileStrategy;
use scopejitter_core::signal::synth::SyntheticConfig;
use scopejitter_core::stats::distribution::AggregateConfig;
use scopejitter_core::sweep::SweepConfig;
use serde::{Deserialize, Serialize};

fn default_param_name() -> String {
    "DCL".to_string()
}

fn default_windows() -> usize {
    5000
}

fn default_num_samples() -> usize {
    500
}

fn default_num_loops() -> usize {
    10
}

fn default_max_retries() -> usize {
    20
}

fn default_stdv_cutoff() -> f64 {
    5.0
}

fn default_bins() -> usize {
    900
}

fn default_deskew() -> f64 {
    30e-9
}

fn default_mismatch_handling() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("jitter_data")
}

/// Register values swept for a known chip parameter; `[0]` otherwise
pub fn register_range(param_name: &str) -> Vec<i64> {
    let range = match param_name {
        "DCcompensate" => 0..8,
        "DSNSPD" => 10..28,
        "VRL" => 1..32,
        "Dbias_NMOS" | "Dbias_PMOS" => 1..6,
        "Dcomp" => 2..16,
        "DCL" => 0..16,
        _ => 0..1,
    };
    range.collect()
}

/// Persistent experiment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Swept chip parameter
    #[serde(default = "default_param_name")]
    pub param_name: String,
    /// Parameters swept one after another; empty sweeps `param_name` alone
    #[serde(default)]
    pub sweep_params: Vec<String>,
    /// Explicit sweep values for every parameter (None = each parameter's
    /// register range)
    #[serde(default)]
    pub sweep_values: Option<Vec<i64>>,
    /// Windows per sequence capture
    #[serde(default = "default_windows")]
    pub windows: usize,
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    #[serde(default = "default_num_loops")]
    pub num_loops: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_stdv_cutoff")]
    pub stdv_cutoff: f64,
    #[serde(default = "default_bins")]
    pub bins: usize,
    /// Reference channel deskew in seconds
    #[serde(default = "default_deskew")]
    pub deskew: f64,
    #[serde(default = "ChannelSettings::reference_default")]
    pub reference: ChannelSettings,
    #[serde(default = "ChannelSettings::chip_default")]
    pub chip: ChannelSettings,
    #[serde(default)]
    pub header: HeaderPolicy,
    /// Recover from edge-count mismatches instead of rejecting the capture
    #[serde(default = "default_mismatch_handling")]
    pub mismatch_handling: bool,
    #[serde(default)]
    pub window_mode: WindowMode,
    /// Root directory for offset files, histograms and summaries
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Signal model for the `simulate` command
    #[serde(default)]
    pub synthetic: SyntheticConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            param_name: default_param_name(),
            sweep_params: Vec::new(),
            sweep_values: None,
            windows: default_windows(),
            num_samples: default_num_samples(),
            num_loops: default_num_loops(),
            max_retries: default_max_retries(),
            stdv_cutoff: default_stdv_cutoff(),
            bins: default_bins(),
            deskew: default_deskew(),
            reference: ChannelSettings::reference_default(),
            chip: ChannelSettings::chip_default(),
            header: HeaderPolicy::default(),
            mismatch_handling: default_mismatch_handling(),
            window_mode: WindowMode::default(),
            output_dir: default_output_dir(),
            synthetic: SyntheticConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load config from disk, falling back to defaults on any error
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }

    /// Parameters to sweep, in order
    pub fn param_list(&self) -> Vec<String> {
        if self.sweep_params.is_empty() {
            vec![self.param_name.clone()]
        } else {
            self.sweep_params.clone()
        }
    }

    pub fn sweep_values(&self) -> Vec<i64> {
        self.sweep_values_for(&self.param_name)
    }

    pub fn sweep_values_for(&self, param_name: &str) -> Vec<i64> {
        self.sweep_values
            .clone()
            .unwrap_or_else(|| register_range(param_name))
    }

    pub fn aggregate_config(&self) -> AggregateConfig {
        AggregateConfig {
            stdv_cutoff: self.stdv_cutoff,
            bins: self.bins,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            reference: self.reference,
            chip: self.chip,
            header: self.header,
            strategy: ReconcileStrategy::from_mismatch_handling(self.mismatch_handling),
            window_mode: self.window_mode,
        }
    }

    pub fn sweep_config(&self) -> SweepConfig {
        self.sweep_config_for(&self.param_name)
    }

    pub fn sweep_config_for(&self, param_name: &str) -> SweepConfig {
        SweepConfig {
            param_name: param_name.to_string(),
            windows: self.windows,
            num_samples: self.num_samples,
            num_loops: self.num_loops,
            max_retries: self.max_retries,
            aggregate: self.aggregate_config(),
            deskew: self.deskew,
        }
    }

    /// Check settings the pipeline cannot recover from at run time
    pub fn validate(&self) -> anyhow::Result<()> {
        self.aggregate_config().validate()?;
        anyhow::ensure!(self.windows > 0, "windows must be positive");
        anyhow::ensure!(self.num_samples > 0, "num_samples must be positive");
        anyhow::ensure!(self.num_loops > 0, "num_loops must be positive");
        anyhow::ensure!(
            !self.param_name.is_empty(),
            "param_name must not be empty"
        );
        anyhow::ensure!(
            self.sweep_params.iter().all(|name| !name.is_empty()),
            "sweep_params must not contain empty names"
        );
        Ok(())
    }
}
