//! Core CLI types - Cli, Command, and argument structs

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use super::types::OutputFormat;
use crate::config::env::WorkerEnv;
use crate::config::schema::RunSpec;

/// Podar: synchronous data-parallel training with gradual block pruning
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "podar")]
#[command(version)]
#[command(about = "Data-parallel training of language models with scheduled block pruning")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run one worker of a training group from YAML configuration
    Train(TrainArgs),

    /// Start a whole worker group on this host
    Launch(LaunchArgs),

    /// Validate a configuration file without training
    Validate(ValidateArgs),

    /// Display information about a configuration
    Info(InfoArgs),
}

/// Overrides applied on top of the YAML configuration
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct OverrideArgs {
    /// Directory for metrics, pruning summaries and the final model
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Override number of epochs
    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// Override per-worker batch size
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Override learning rate
    #[arg(short, long)]
    pub lr: Option<f32>,

    /// Seed for model initialisation and shuffling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Coordination timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl OverrideArgs {
    /// Command-line form of these overrides, for child processes
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(dir) = &self.output_dir {
            args.extend(["--output-dir".to_string(), dir.display().to_string()]);
        }
        if let Some(epochs) = self.epochs {
            args.extend(["--epochs".to_string(), epochs.to_string()]);
        }
        if let Some(batch_size) = self.batch_size {
            args.extend(["--batch-size".to_string(), batch_size.to_string()]);
        }
        if let Some(lr) = self.lr {
            args.extend(["--lr".to_string(), lr.to_string()]);
        }
        if let Some(seed) = self.seed {
            args.extend(["--seed".to_string(), seed.to_string()]);
        }
        if let Some(timeout) = self.timeout {
            args.extend(["--timeout".to_string(), timeout.to_string()]);
        }
        args
    }
}

/// Worker assignment flags; they take precedence over `PODAR_*` variables
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct WorkerArgs {
    /// Global rank of this worker
    #[arg(long)]
    pub rank: Option<usize>,

    /// Number of workers in the group
    #[arg(long)]
    pub world_size: Option<usize>,

    /// Rank among the workers on this host
    #[arg(long)]
    pub local_rank: Option<usize>,

    /// Number of workers on this host
    #[arg(long)]
    pub local_world_size: Option<usize>,

    /// Rendezvous address of rank 0 (host:port)
    #[arg(long)]
    pub master_addr: Option<String>,
}

impl From<&WorkerArgs> for WorkerEnv {
    fn from(args: &WorkerArgs) -> Self {
        Self {
            rank: args.rank,
            world_size: args.world_size,
            local_rank: args.local_rank,
            local_world_size: args.local_world_size,
            master_addr: args.master_addr.clone(),
        }
    }
}

/// Arguments for the train command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct TrainArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    #[command(flatten)]
    pub worker: WorkerArgs,

    /// Dry run (validate config but don't train)
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the launch command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct LaunchArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Number of worker processes to start
    #[arg(short, long, default_value_t = 1)]
    pub nproc: usize,

    /// Rendezvous address (defaults to the config's)
    #[arg(long)]
    pub master_addr: Option<String>,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Show detailed validation report
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for the info command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct InfoArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Output format (text, json, yaml)
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Parse CLI arguments from a string slice (for testing)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Apply command-line overrides to a RunSpec
///
/// `--output-dir` sets the log directory and places the final model inside
/// it as `model.safetensors`.
pub fn apply_overrides(spec: &mut RunSpec, args: &OverrideArgs) {
    if let Some(output_dir) = &args.output_dir {
        spec.output.log_dir = Some(output_dir.clone());
        spec.output.model_path = Some(output_dir.join("model.safetensors"));
    }
    if let Some(epochs) = args.epochs {
        spec.training.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        spec.data.batch_size = batch_size;
    }
    if let Some(lr) = args.lr {
        spec.optimizer.lr = lr;
    }
    if let Some(seed) = args.seed {
        spec.model.seed = seed;
        spec.data.seed = seed;
    }
    if let Some(timeout) = args.timeout {
        spec.distributed.timeout_secs = timeout;
    }
}
