//! Pruning configuration module
//!
//! Schedule, block geometry and pooling for the Sparsification Controller.

mod pattern;
mod pruning_config;


pub use pattern::{BlockPooling, BlockShape};
pub use pruning_config::PruningConfig;
