//! Block magnitude masks.
//!
//! A mask is a 0/1 matrix with the shape of the weight it covers. Blocks
//! are tiles of `height × width` elements (edge tiles may be partial) and
//! are always masked as a whole.

use ndarray::{s, Array2};

use super::config::{BlockPooling, BlockShape};

/// Score of one block: whether it is already fully masked, and the pooled
/// magnitude of its currently unmasked weights.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BlockScore {
    index: usize,
    masked: bool,
    score: f32,
}

fn block_scores(
    weights: &Array2<f32>,
    mask: &Array2<f32>,
    block: BlockShape,
    pooling: BlockPooling,
) -> Vec<BlockScore> {
    let (rows, cols) = weights.dim();
    let (grid_rows, grid_cols) = block.grid(rows, cols);
    let mut scores = Vec::with_capacity(grid_rows * grid_cols);
    for bi in 0..grid_rows {
        for bj in 0..grid_cols {
            let r = bi * block.height..((bi + 1) * block.height).min(rows);
            let c = bj * block.width..((bj + 1) * block.width).min(cols);
            let w = weights.slice(s![r.clone(), c.clone()]);
            let m = mask.slice(s![r, c]);
            let masked = m.iter().all(|&v| v == 0.0);
            let score = pooling.pool(w.iter().zip(m.iter()).map(|(&w, &m)| (w * m).abs()));
            scores.push(BlockScore { index: bi * grid_cols + bj, masked, score });
        }
    }
    scores
}

/// Recompute `mask` so that `round(target × blocks)` blocks are masked.
///
/// Blocks that are already masked are chosen first, then the blocks with
/// the smallest pooled magnitude; ties break on block index. The result is
/// intersected with the previous mask, so nothing is ever unmasked.
///
/// Returns the number of masked blocks.
pub fn update_block_mask(
    weights: &Array2<f32>,
    mask: &mut Array2<f32>,
    target: f32,
    block: BlockShape,
    pooling: BlockPooling,
) -> usize {
    let (rows, cols) = weights.dim();
    let (_, grid_cols) = block.grid(rows, cols);
    let mut scores = block_scores(weights, mask, block, pooling);
    let num_blocks = scores.len();
    let to_prune = ((target.clamp(0.0, 1.0) * num_blocks as f32).round() as usize).min(num_blocks);

    scores.sort_by(|a, b| {
        b.masked
            .cmp(&a.masked)
            .then(a.score.total_cmp(&b.score))
            .then(a.index.cmp(&b.index))
    });

    for victim in scores.iter().take(to_prune) {
        let (bi, bj) = (victim.index / grid_cols, victim.index % grid_cols);
        let r = bi * block.height..((bi + 1) * block.height).min(rows);
        let c = bj * block.width..((bj + 1) * block.width).min(cols);
        mask.slice_mut(s![r, c]).fill(0.0);
    }

    let already_masked = scores.iter().filter(|s| s.masked).count();
    to_prune.max(already_masked)
}

/// Fraction of masked entries.
pub fn mask_sparsity(mask: &Array2<f32>) -> f32 {
    if mask.is_empty() {
        return 0.0;
    }
    mask.iter().filter(|&&m| m == 0.0).count() as f32 / mask.len() as f32
}
