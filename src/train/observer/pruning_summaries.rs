//! Per-update pruning summaries as JSON lines

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::jsonl::JsonlWriter;
use super::traits::{Observer, ObserverAction, ObserverContext};
use crate::error::Result;
use crate::prune::TensorSparsityInfo;

/// Default file name under the log directory.
pub const PRUNING_FILE: &str = "pruning.jsonl";

/// One line of `pruning.jsonl`, written whenever masks are recomputed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruningSummary {
    /// RFC 3339 wall-clock time
    pub timestamp: String,
    pub epoch: usize,
    pub step: usize,
    pub target_sparsity: f32,
    pub achieved_sparsity: f32,
    pub layers: Vec<TensorSparsityInfo>,
}

/// Records target and achieved sparsity at every mask update
#[derive(Debug)]
pub struct PruningSummaries {
    out: JsonlWriter,
    written: usize,
}

impl PruningSummaries {
    /// Open (append) `log_dir/pruning.jsonl`.
    pub fn create(log_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self { out: JsonlWriter::open(log_dir.as_ref(), PRUNING_FILE)?, written: 0 })
    }

    /// Path of the summary file
    pub fn path(&self) -> &Path {
        self.out.path()
    }

    /// Summaries written by this instance
    pub fn written(&self) -> usize {
        self.written
    }
}

impl Observer for PruningSummaries {
    fn on_train_begin(&mut self, ctx: &ObserverContext) -> Result<ObserverAction> {
        self.on_step_end(ctx)
    }

    fn on_step_end(&mut self, ctx: &ObserverContext) -> Result<ObserverAction> {
        if let Some(update) = ctx.mask_update {
            self.out.append(&PruningSummary {
                timestamp: chrono::Utc::now().to_rfc3339(),
                epoch: ctx.epoch,
                step: update.step,
                target_sparsity: update.target_sparsity,
                achieved_sparsity: update.achieved_sparsity,
                layers: ctx.layers.clone(),
            })?;
            self.written += 1;
        }
        Ok(ObserverAction::Continue)
    }

    fn on_epoch_end(&mut self, _ctx: &ObserverContext) -> Result<ObserverAction> {
        self.out.flush()?;
        Ok(ObserverAction::Continue)
    }

    fn on_train_end(&mut self, _ctx: &ObserverContext) -> Result<()> {
        self.out.flush()
    }

    fn name(&self) -> &'static str {
        "PruningSummaries"
    }
}
