//! Training Driver
//!
//! `Idle → Running → {Converged, Exhausted, Failed}`. Each step pulls a
//! batch, computes masked loss and gradients, synchronizes them through the
//! Distributed Gradient Coordinator and advances the pruning masks.
//! `EndOfShard` ends the epoch; every other error fails the run.

mod config;
mod core;
mod run;
mod state;

#[cfg(test)]
mod tests;

pub use config::DriverConfig;
pub use core::TrainingDriver;
pub use state::{DriverPhase, RunFailure, RunOutcome, TrainingRunState};
