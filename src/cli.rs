use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "scopejitter",
    version,
    about = "Timing jitter between a reference and a chip output from oscilloscope sequence captures",
    long_about = "Reconstructs sequence-mode captures into windows, locates threshold crossings \
                  on both channels, pairs them into per-window offsets and fits the offset \
                  distribution (FWHM)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// JSON config file (defaults when absent)
    #[arg(short, long, global = true, default_value = "scopejitter.json")]
    pub config: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract offsets from a saved dual-channel capture
    Analyze(AnalyzeArgs),
    /// Fit the distribution of one or more offset files
    Aggregate(AggregateArgs),
    /// Run a parameter sweep against the synthetic signal source
    Simulate(SimulateArgs),
    /// Write the effective configuration to the config path
    InitConfig,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Capture JSON (`DualCapture`)
    pub capture: PathBuf,

    /// Write offsets here, one per line
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AggregateArgs {
    /// Offset text files, one value per line
    #[arg(required = true, num_args = 1..)]
    pub files: Vec<PathBuf>,

    /// Override the configured sigma cutoff (0 disables filtering)
    #[arg(long)]
    pub stdv_cutoff: Option<f64>,

    /// Override the configured bin count
    #[arg(long)]
    pub bins: Option<usize>,

    /// Write the histogram PNG here
    #[arg(long)]
    pub histogram: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Sweep values (defaults to the configured values or the parameter's register range)
    #[arg(long, num_args = 1..)]
    pub values: Option<Vec<i64>>,

    /// Parameters to sweep in order (defaults to the configured list)
    #[arg(long, num_args = 1..)]
    pub params: Option<Vec<String>>,

    /// Override the artifact directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Override the capture loops per sweep value
    #[arg(long)]
    pub loops: Option<usize>,

    /// Override windows per capture
    #[arg(long)]
    pub windows: Option<usize>,

    /// Seed for the synthetic source
    #[arg(long)]
    pub seed: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_aggregate() {
        let cli = Cli::parse_from(["scopejitter", "-vv", "aggregate", "a.txt", "b.txt", "--bins", "50"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Aggregate(args) => {
                assert_eq!(args.files.len(), 2);
                assert_eq!(args.bins, Some(50));
                assert_eq!(args.stdv_cutoff, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_simulate_values() {
        let cli = Cli::parse_from([
            "scopejitter",
            "simulate",
            "--values",
            "2",
            "4",
            "--config",
            "bench.json",
        ]);
        assert_eq!(cli.config, PathBuf::from("bench.json"));
        match cli.command {
            Command::Simulate(args) => {
                assert_eq!(args.values, Some(vec![2, 4]));
                assert_eq!(args.params, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_simulate_params() {
        let cli = Cli::parse_from(["scopejitter", "simulate", "--params", "VRL", "Dcomp", "--loops", "2"]);
        match cli.command {
            Command::Simulate(args) => {
                assert_eq!(args.params, Some(vec!["VRL".to_string(), "Dcomp".to_string()]));
                assert_eq!(args.loops, Some(2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
