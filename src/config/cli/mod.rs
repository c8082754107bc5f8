//! CLI argument parsing
//!
//! # Usage
//!
//! ```bash
//! podar train run.yaml
//! podar train run.yaml --rank 1 --world-size 4 --master-addr 10.0.0.1:29500
//! podar launch run.yaml --nproc 4 --output-dir ./out
//! podar validate run.yaml
//! podar info run.yaml --format json
//! ```

mod core;
mod types;

#[cfg(test)]
mod tests;

pub use core::{
    apply_overrides, parse_args, Cli, Command, InfoArgs, LaunchArgs, OverrideArgs, TrainArgs,
    ValidateArgs, WorkerArgs,
};
pub use types::OutputFormat;
