//! Sparsification Controller: a model plus per-layer block masks.

use ndarray::Array2;
use serde::Serialize;
use tracing::debug;

use super::config::PruningConfig;
use super::export::TensorSparsityInfo;
use super::mask::{mask_sparsity, update_block_mask};
use crate::data::Batch;
use crate::error::Result;
use crate::model::{Evaluation, LanguageModel, LossAndGrads, Parameter};
use crate::precision::Precision;

/// Result of a mask recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MaskUpdate {
    /// Step the masks were recomputed for
    pub step: usize,
    /// Scheduled sparsity at that step
    pub target_sparsity: f32,
    /// Fraction of prunable weights actually masked
    pub achieved_sparsity: f32,
}

/// A [`LanguageModel`] wrapped with block masks driven by a sparsity schedule.
///
/// Stored weights are never modified by masking; the forward pass sees
/// `weight ⊙ mask` and masked positions receive zero gradient. Only
/// [`finalize`](Self::finalize) writes the zeros into the weights.
///
/// ```
/// use podar::dist::BoundDevice;
/// use podar::model::{BigramConfig, BigramLm, LanguageModel};
/// use podar::prune::{PrunableModel, PruningConfig, SparsitySchedule};
///
/// let model = BigramLm::new(BigramConfig::new(16, 4), &BoundDevice::cpu(), 0).unwrap();
/// let schedule = SparsitySchedule::constant(0.5, 0).unwrap();
/// let mut prunable = PrunableModel::wrap(model, PruningConfig::new(schedule)).unwrap();
///
/// let update = prunable.update_masks(0).unwrap();
/// assert_eq!(update.target_sparsity, 0.5);
///
/// let dense = prunable.finalize();
/// let zeros = dense.parameters()[0].zero_fraction();
/// assert!(zeros >= 0.5);
/// ```
#[derive(Debug, Clone)]
pub struct PrunableModel<M: LanguageModel> {
    model: M,
    config: PruningConfig,
    masks: Vec<Option<Array2<f32>>>,
    last_update: Option<MaskUpdate>,
}

impl<M: LanguageModel> PrunableModel<M> {
    /// Wrap `model`; every prunable parameter starts fully unmasked.
    ///
    /// # Errors
    ///
    /// [`Error::ScheduleInvariant`](crate::Error::ScheduleInvariant) or
    /// [`Error::Configuration`](crate::Error::Configuration) if the pruning
    /// configuration is invalid.
    pub fn wrap(model: M, config: PruningConfig) -> Result<Self> {
        config.validate()?;
        let masks = model
            .parameters()
            .iter()
            .map(|p| p.prunable.then(|| Array2::ones(p.value.dim())))
            .collect();
        Ok(Self { model, config, masks, last_update: None })
    }

    pub fn config(&self) -> &PruningConfig {
        &self.config
    }

    /// Wrapped model (stored weights, masks not applied)
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Parameters for the optimizer to update.
    pub fn parameters_mut(&mut self) -> &mut [Parameter] {
        self.model.parameters_mut()
    }

    /// Per-parameter masks; `None` for parameters that are never pruned.
    pub fn masks(&self) -> &[Option<Array2<f32>>] {
        &self.masks
    }

    /// Most recent mask recomputation.
    pub fn last_update(&self) -> Option<MaskUpdate> {
        self.last_update
    }

    /// Weights as the forward pass sees them.
    pub fn effective_weights(&self) -> Vec<Array2<f32>> {
        self.model
            .parameters()
            .iter()
            .zip(&self.masks)
            .map(|(p, mask)| match mask {
                Some(mask) => &p.value * mask,
                None => p.value.clone(),
            })
            .collect()
    }

    /// Forward/backward through the masked weights; masked gradients are zero.
    pub fn loss_and_grads(
        &self,
        batch: &Batch,
        precision: Precision,
        loss_scale: f32,
    ) -> Result<LossAndGrads> {
        let weights = self.effective_weights();
        let mut out = self.model.loss_and_grads(&weights, batch, precision, loss_scale)?;
        for (grad, mask) in out.grads.iter_mut().zip(&self.masks) {
            if let Some(mask) = mask {
                *grad *= mask;
            }
        }
        Ok(out)
    }

    /// Loss and accuracy of `batch` through the masked weights.
    pub fn evaluate(&self, batch: &Batch, precision: Precision) -> Result<Evaluation> {
        self.model.evaluate(&self.effective_weights(), batch, precision)
    }

    /// Recompute masks for `step` if the schedule asks for it.
    ///
    /// Masks only ever lose entries: a position masked at one step stays
    /// masked for every later step.
    pub fn update_masks(&mut self, step: usize) -> Option<MaskUpdate> {
        let schedule = self.config.schedule();
        if !schedule.should_update(step) {
            return None;
        }
        let target = schedule.target_at(step);
        let (block, pooling) = (self.config.block(), self.config.pooling());

        for (param, mask) in self.model.parameters().iter().zip(self.masks.iter_mut()) {
            if let Some(mask) = mask {
                update_block_mask(&param.value, mask, target, block, pooling);
            }
        }

        let update = MaskUpdate { step, target_sparsity: target, achieved_sparsity: self.sparsity() };
        debug!(step, target, achieved = update.achieved_sparsity, "updated pruning masks");
        self.last_update = Some(update);
        Some(update)
    }

    /// Scheduled sparsity at `step`.
    pub fn target_sparsity(&self, step: usize) -> f32 {
        self.config.schedule().target_at(step)
    }

    /// Fraction of masked entries over all prunable parameters.
    pub fn sparsity(&self) -> f32 {
        let (masked, total) = self
            .masks
            .iter()
            .flatten()
            .fold((0usize, 0usize), |(z, n), m| {
                (z + m.iter().filter(|&&v| v == 0.0).count(), n + m.len())
            });
        if total == 0 {
            0.0
        } else {
            masked as f32 / total as f32
        }
    }

    /// Mask sparsity of each prunable parameter.
    pub fn layer_sparsity(&self) -> Vec<TensorSparsityInfo> {
        self.model
            .parameters()
            .iter()
            .zip(&self.masks)
            .filter_map(|(p, mask)| {
                mask.as_ref().map(|m| {
                    let total_count = m.len();
                    let zero_count = m.iter().filter(|&&v| v == 0.0).count();
                    TensorSparsityInfo {
                        name: p.name.clone(),
                        sparsity: mask_sparsity(m),
                        zero_count,
                        total_count,
                    }
                })
            })
            .collect()
    }

    /// Apply every mask to its weights permanently and drop the masks.
    ///
    /// Wrapping the result again and finalizing yields the same weights.
    pub fn finalize(mut self) -> M {
        for (param, mask) in self.model.parameters_mut().iter_mut().zip(&self.masks) {
            if let Some(mask) = mask {
                param.value *= mask;
            }
        }
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::BoundDevice;
    use crate::model::{BigramConfig, BigramLm};
    use crate::prune::{BlockPooling, BlockShape, SparsitySchedule};

    fn model() -> BigramLm {
        BigramLm::new(BigramConfig::new(16, 8), &BoundDevice::cpu(), 11).unwrap()
    }

    fn config() -> PruningConfig {
        let schedule = SparsitySchedule::polynomial_decay(0.0, 0.5, 0, 40).unwrap().with_frequency(10).unwrap();
        PruningConfig::new(schedule).with_block(BlockShape::new(1, 4)).with_pooling(BlockPooling::Avg)
    }

    fn batch() -> Batch {
        Batch::new(vec![vec![1, 2, 3, 4, 5, 6, 7], vec![8, 9, 10]])
    }

    #[test]
    fn test_wrap_starts_dense() {
        let p = PrunableModel::wrap(model(), config()).unwrap();
        assert_eq!(p.sparsity(), 0.0);
        assert!(p.masks()[0].is_some());
        assert!(p.masks()[2].is_none(), "bias is never pruned");
        assert_eq!(p.effective_weights(), p.model().weights());
    }

    #[test]
    fn test_updates_follow_schedule() {
        let mut p = PrunableModel::wrap(model(), config()).unwrap();
        assert!(p.update_masks(5).is_none());
        let update = p.update_masks(20).unwrap();
        assert!(update.target_sparsity > 0.0 && update.target_sparsity < 0.5);
        let last = p.update_masks(40).unwrap();
        assert_eq!(last.target_sparsity, 0.5);
        assert!((last.achieved_sparsity - 0.5).abs() < 0.05);
        assert_eq!(p.last_update(), Some(last));
    }

    #[test]
    fn test_masks_do_not_touch_stored_weights() {
        let original = model();
        let mut p = PrunableModel::wrap(original.clone(), config()).unwrap();
        p.update_masks(40);
        assert_eq!(p.model().parameters(), original.parameters());
        assert_ne!(p.effective_weights(), original.weights());
    }

    #[test]
    fn test_masked_gradients_are_zero() {
        let mut p = PrunableModel::wrap(model(), config()).unwrap();
        p.update_masks(40);
        let out = p.loss_and_grads(&batch(), Precision::Fp32, 1.0).unwrap();
        for (grad, mask) in out.grads.iter().zip(p.masks()) {
            if let Some(mask) = mask {
                for (&g, &m) in grad.iter().zip(mask.iter()) {
                    if m == 0.0 {
                        assert_eq!(g, 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut p = PrunableModel::wrap(model(), config()).unwrap();
        p.update_masks(40);
        let once = p.finalize();
        let twice = PrunableModel::wrap(once.clone(), config()).unwrap().finalize();
        assert_eq!(once.parameters(), twice.parameters());
        assert!(once.parameters()[0].zero_fraction() >= 0.45);
        assert_eq!(once.parameters()[2].zero_fraction(), 1.0, "bias starts at zero and is untouched");
    }

    #[test]
    fn test_layer_sparsity_lists_prunable_only() {
        let mut p = PrunableModel::wrap(model(), config()).unwrap();
        p.update_masks(40);
        let layers = p.layer_sparsity();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].name, "embedding.weight");
        assert_eq!(layers[0].total_count, 16 * 8);
    }
}
