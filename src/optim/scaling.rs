//! Learning-rate scaling for data-parallel runs.

use serde::{Deserialize, Serialize};

/// How the configured learning rate reacts to the worker-group size.
///
/// The global batch of a data-parallel run is `batch_size × world_size`.
/// Nothing is rescaled unless asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LrScaling {
    /// Use the configured learning rate as is
    #[default]
    None,
    /// Multiply the learning rate by the group size (linear scaling rule)
    Linear,
}

impl LrScaling {
    /// Learning rate actually handed to the optimizer
    pub fn effective_lr(&self, base_lr: f32, world_size: usize) -> f32 {
        match self {
            LrScaling::None => base_lr,
            LrScaling::Linear => base_lr * world_size as f32,
        }
    }
}
