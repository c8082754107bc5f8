//! Main pruning configuration struct.

use serde::{Deserialize, Serialize};

use super::{BlockPooling, BlockShape};
use crate::error::{Error, Result};
use crate::prune::schedule::SparsitySchedule;

/// Configuration of the Sparsification Controller.
///
/// # Example
///
/// ```
/// use podar::prune::{BlockPooling, BlockShape, PruningConfig, SparsitySchedule};
///
/// let config = PruningConfig::new(SparsitySchedule::polynomial_decay(0.0, 0.5, 0, 9999).unwrap())
///     .with_block(BlockShape::new(1, 16))
///     .with_pooling(BlockPooling::Avg);
/// assert_eq!(config.block().area(), 16);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruningConfig {
    /// Sparsity schedule driving mask updates.
    schedule: SparsitySchedule,

    /// Shape of the blocks pruned together.
    #[serde(default, rename = "block_size")]
    block: BlockShape,

    /// Aggregation of magnitudes inside a block.
    #[serde(default, rename = "block_pooling")]
    pooling: BlockPooling,
}

impl PruningConfig {
    /// Create a configuration with unit blocks and average pooling.
    pub fn new(schedule: SparsitySchedule) -> Self {
        Self {
            schedule,
            block: BlockShape::default(),
            pooling: BlockPooling::default(),
        }
    }

    /// Set the block shape.
    pub fn with_block(mut self, block: BlockShape) -> Self {
        self.block = block;
        self
    }

    /// Set the block pooling.
    pub fn with_pooling(mut self, pooling: BlockPooling) -> Self {
        self.pooling = pooling;
        self
    }

    /// Sparsity schedule.
    pub fn schedule(&self) -> &SparsitySchedule {
        &self.schedule
    }

    /// Block shape.
    pub fn block(&self) -> BlockShape {
        self.block
    }

    /// Block pooling.
    pub fn pooling(&self) -> BlockPooling {
        self.pooling
    }

    /// Validate block geometry and the schedule.
    pub fn validate(&self) -> Result<()> {
        if self.block.height == 0 || self.block.width == 0 {
            return Err(Error::Configuration(format!(
                "block_size [{}, {}] must have positive dimensions",
                self.block.height, self.block.width
            )));
        }
        self.schedule.validate()
    }
}
