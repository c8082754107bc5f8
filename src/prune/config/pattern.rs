//! Block sparsity pattern configuration.

use serde::{Deserialize, Serialize};

/// Shape of the weight blocks that are pruned together.
///
/// Serialized as a `[height, width]` pair, e.g. `block_size: [1, 16]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[usize; 2]", into = "[usize; 2]")]
pub struct BlockShape {
    /// Block height (rows).
    pub height: usize,
    /// Block width (columns).
    pub width: usize,
}

impl BlockShape {
    /// Create a block shape.
    pub const fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Single-element blocks (unstructured magnitude pruning).
    pub const fn unit() -> Self {
        Self::new(1, 1)
    }

    /// Number of elements in a full block.
    pub fn area(&self) -> usize {
        self.height * self.width
    }

    /// Number of blocks needed to tile a `rows × cols` matrix.
    ///
    /// Edge blocks may be partial.
    pub fn grid(&self, rows: usize, cols: usize) -> (usize, usize) {
        (rows.div_ceil(self.height), cols.div_ceil(self.width))
    }
}

impl Default for BlockShape {
    fn default() -> Self {
        Self::unit()
    }
}

impl From<[usize; 2]> for BlockShape {
    fn from([height, width]: [usize; 2]) -> Self {
        Self { height, width }
    }
}

impl From<BlockShape> for [usize; 2] {
    fn from(shape: BlockShape) -> Self {
        [shape.height, shape.width]
    }
}

/// How weight magnitudes inside a block are aggregated into one score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockPooling {
    /// Mean absolute value.
    #[default]
    Avg,
    /// Maximum absolute value.
    Max,
}

impl BlockPooling {
    /// Pool an iterator of absolute magnitudes.
    ///
    /// Returns 0.0 for an empty block.
    pub fn pool(&self, magnitudes: impl Iterator<Item = f32>) -> f32 {
        match self {
            BlockPooling::Avg => {
                let (sum, count) = magnitudes.fold((0.0f32, 0usize), |(s, n), m| (s + m, n + 1));
                if count == 0 {
                    0.0
                } else {
                    sum / count as f32
                }
            }
            BlockPooling::Max => magnitudes.fold(0.0f32, f32::max),
        }
    }
}
