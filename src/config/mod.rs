//! Declarative run configuration
//!
//! A run is described by one YAML file ([`RunSpec`]); the worker's place in
//! the group comes from `PODAR_*` variables or command-line flags
//! ([`WorkerEnv`]).

mod builder;
pub mod cli;
pub mod env;
mod loader;
mod schema;
mod validate;

pub use builder::{build_model, build_optimizer, build_tokenizer};
pub use cli::{apply_overrides, parse_args, Cli, Command};
pub use env::WorkerEnv;
pub use loader::{load_config, parse_config};
pub use schema::{
    DataSpec, DistributedSpec, ModelSpec, OptimSpec, OutputSpec, RunSpec, RuntimeSpec,
    TokenizerSpec, TrainingParams,
};
pub use validate::{check_paths, validate_config, ValidationError};
