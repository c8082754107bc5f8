//! Core traits and types for the observer system
//!
//! - `ObserverContext` - State passed to observers
//! - `ObserverAction` - Actions an observer can request
//! - `Observer` - The trait all observers implement

use serde::Serialize;

use crate::error::Result;
use crate::prune::{MaskUpdate, TensorSparsityInfo};

/// Context passed to observers with the current training state
#[derive(Clone, Debug, Default, Serialize)]
pub struct ObserverContext {
    /// Rank of the worker running the observer
    pub rank: usize,
    /// Current epoch (0-indexed)
    pub epoch: usize,
    /// Total epochs planned
    pub max_epochs: usize,
    /// Global step count (completed steps)
    pub step: usize,
    /// Steps completed in the current epoch
    pub epoch_step: usize,
    /// Local loss of the last step, or mean training loss at epoch end
    pub loss: f32,
    /// Next-token accuracy matching `loss`
    pub accuracy: Option<f32>,
    /// Group-wide validation accuracy (epoch end, with a validation set)
    pub val_accuracy: Option<f32>,
    /// Current learning rate
    pub lr: f32,
    /// Current loss scale
    pub loss_scale: f32,
    /// Whether the last step's update was applied (false on overflow)
    pub applied: bool,
    /// Global norm of the averaged gradient
    pub grad_norm: Option<f32>,
    /// Scheduled sparsity at the current step
    pub target_sparsity: f32,
    /// Fraction of prunable weights currently masked
    pub sparsity: f32,
    /// Mask recomputation performed at this step
    pub mask_update: Option<MaskUpdate>,
    /// Per-layer sparsity, filled in when masks were recomputed
    pub layers: Vec<TensorSparsityInfo>,
    /// Group-averaged loss monitored for early stopping (epoch end)
    pub monitored_loss: Option<f32>,
    /// Best monitored loss so far
    pub best_loss: Option<f32>,
    /// Training duration in seconds
    pub elapsed_secs: f64,
}

/// Action to take after an observer runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObserverAction {
    /// Continue training normally
    Continue,
    /// Ask the group to stop training
    Stop,
}

/// Trait for training observers
///
/// Invoked synchronously, in registration order, by the Training Driver.
/// All methods default to no-ops. A `Stop` request is voted on by the
/// whole group before the next step, so every worker stops together.
pub trait Observer: Send {
    /// Called before the first step
    fn on_train_begin(&mut self, _ctx: &ObserverContext) -> Result<ObserverAction> {
        Ok(ObserverAction::Continue)
    }

    /// Called after each training step
    fn on_step_end(&mut self, _ctx: &ObserverContext) -> Result<ObserverAction> {
        Ok(ObserverAction::Continue)
    }

    /// Called after each epoch, once the monitored loss is known
    fn on_epoch_end(&mut self, _ctx: &ObserverContext) -> Result<ObserverAction> {
        Ok(ObserverAction::Continue)
    }

    /// Called after a successful run
    fn on_train_end(&mut self, _ctx: &ObserverContext) -> Result<()> {
        Ok(())
    }

    /// Observer name for logging
    fn name(&self) -> &'static str {
        "Observer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_context_default() {
        let ctx = ObserverContext::default();
        assert_eq!(ctx.epoch, 0);
        assert_eq!(ctx.loss, 0.0);
        assert!(ctx.best_loss.is_none());
        assert!(ctx.mask_update.is_none());
    }

    #[test]
    fn test_default_observer_impl() {
        struct Minimal;
        impl Observer for Minimal {}

        let mut obs = Minimal;
        let ctx = ObserverContext::default();
        assert_eq!(obs.on_train_begin(&ctx).unwrap(), ObserverAction::Continue);
        assert_eq!(obs.on_step_end(&ctx).unwrap(), ObserverAction::Continue);
        assert_eq!(obs.on_epoch_end(&ctx).unwrap(), ObserverAction::Continue);
        assert!(obs.on_train_end(&ctx).is_ok());
        assert_eq!(obs.name(), "Observer");
    }
}
