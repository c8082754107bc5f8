//! Podar: synchronous data-parallel training with gradual block pruning
//!
//! Every worker of a fixed-size group holds a full replica of a language
//! model, trains on its own shard of the data, and averages gradients with
//! its peers before each update. Along the way a sparsity schedule zeroes
//! out whole blocks of weights, so the model written at the end is sparse.
//!
//! # Architecture
//!
//! - [`dist`]: worker identity, device binding, collectives and the
//!   gradient-averaging optimizer wrapper
//! - [`data`]: JSON-lines records, per-rank shards and batches
//! - [`prune`]: sparsity schedules, block masks and sparse export
//! - [`train`]: the Training Driver, observers and the model finalizer
//! - [`config`]: YAML run configuration and the command-line surface
//! - [`run`]: wiring a worker together from a configuration
//!
//! # Example
//!
//! ```no_run
//! use podar::config::{load_config, WorkerEnv};
//! use podar::run::run_worker;
//!
//! let spec = load_config("run.yaml")?;
//! let report = run_worker(&spec, &WorkerEnv::from_env()?)?;
//! println!("{} after {} steps", report.phase, report.state.current_step);
//! # Ok::<(), podar::Error>(())
//! ```

pub mod cli;
pub mod config;
pub mod data;
pub mod dist;
pub mod error;
pub mod model;
pub mod optim;
pub mod precision;
pub mod prune;
pub mod run;
pub mod runtime;
pub mod tokenizer;
pub mod train;

pub use error::{Error, ErrorCategory, Result};
