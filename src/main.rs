//! Podar CLI
//!
//! # Usage
//!
//! ```bash
//! # Train in a single process
//! podar train run.yaml
//!
//! # Start a four-worker group on this host
//! podar launch run.yaml --nproc 4 --output-dir ./out
//!
//! # Join a group started elsewhere
//! PODAR_RANK=1 PODAR_WORLD_SIZE=2 PODAR_MASTER_ADDR=10.0.0.1:29500 podar train run.yaml
//!
//! # Validate config
//! podar validate run.yaml --detailed
//! ```

use clap::Parser;
use podar::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
