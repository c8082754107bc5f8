//! Progress observer for logging training progress

use tracing::{info, warn};

use super::traits::{Observer, ObserverAction, ObserverContext};
use crate::error::Result;

/// Logs step and epoch progress through `tracing`
#[derive(Clone, Debug)]
pub struct ProgressObserver {
    /// Log every N steps
    log_interval: usize,
}

impl ProgressObserver {
    /// Create progress observer
    pub fn new(log_interval: usize) -> Self {
        Self { log_interval: log_interval.max(1) }
    }

    /// Steps between progress lines
    pub fn log_interval(&self) -> usize {
        self.log_interval
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self { log_interval: 10 }
    }
}

impl Observer for ProgressObserver {
    fn on_step_end(&mut self, ctx: &ObserverContext) -> Result<ObserverAction> {
        if !ctx.applied {
            warn!(rank = ctx.rank, step = ctx.step, loss_scale = ctx.loss_scale, "step skipped");
        }
        if let Some(update) = ctx.mask_update {
            info!(
                rank = ctx.rank,
                step = update.step,
                target_sparsity = %format!("{:.3}", update.target_sparsity),
                achieved = %format!("{:.3}", update.achieved_sparsity),
                "masks updated"
            );
        }
        if ctx.step.is_multiple_of(self.log_interval) {
            info!(
                rank = ctx.rank,
                epoch = ctx.epoch + 1,
                step = ctx.step,
                loss = %format!("{:.4}", ctx.loss),
                lr = %format!("{:.2e}", ctx.lr),
                sparsity = %format!("{:.3}", ctx.sparsity),
                "step"
            );
        }
        Ok(ObserverAction::Continue)
    }

    fn on_epoch_end(&mut self, ctx: &ObserverContext) -> Result<ObserverAction> {
        info!(
            rank = ctx.rank,
            epoch = ctx.epoch + 1,
            max_epochs = ctx.max_epochs,
            steps = ctx.epoch_step,
            loss = %format!("{:.4}", ctx.loss),
            accuracy = ?ctx.accuracy,
            val_accuracy = ?ctx.val_accuracy,
            monitored = ?ctx.monitored_loss,
            best = ?ctx.best_loss,
            elapsed = %format!("{:.1}s", ctx.elapsed_secs),
            "epoch finished"
        );
        Ok(ObserverAction::Continue)
    }

    fn on_train_end(&mut self, ctx: &ObserverContext) -> Result<()> {
        info!(
            rank = ctx.rank,
            steps = ctx.step,
            sparsity = %format!("{:.3}", ctx.sparsity),
            elapsed = %format!("{:.1}s", ctx.elapsed_secs),
            "training finished"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ProgressObserver"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_never_stops() {
        let mut progress = ProgressObserver::new(5);
        let ctx = ObserverContext { step: 5, loss: 0.5, applied: true, ..Default::default() };
        assert_eq!(progress.on_step_end(&ctx).unwrap(), ObserverAction::Continue);
        assert_eq!(progress.on_epoch_end(&ctx).unwrap(), ObserverAction::Continue);
        assert_eq!(progress.name(), "ProgressObserver");
    }

    #[test]
    fn test_zero_interval_clamped() {
        assert_eq!(ProgressObserver::new(0).log_interval(), 1);
        assert_eq!(ProgressObserver::default().log_interval(), 10);
    }
}
