//! Step and epoch metrics as JSON lines

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::jsonl::JsonlWriter;
use super::traits::{Observer, ObserverAction, ObserverContext};
use crate::error::Result;

/// Default file name under the log directory.
pub const METRICS_FILE: &str = "metrics.jsonl";

/// Kind of a metrics record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsEvent {
    Step,
    Epoch,
}

/// One line of `metrics.jsonl`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// RFC 3339 wall-clock time
    pub timestamp: String,
    pub event: MetricsEvent,
    pub epoch: usize,
    pub step: usize,
    pub loss: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f32>,
    pub lr: f32,
    pub loss_scale: f32,
    pub sparsity: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grad_norm: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitored_loss: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_loss: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_accuracy: Option<f32>,
}

impl MetricsRecord {
    fn new(event: MetricsEvent, ctx: &ObserverContext) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            event,
            epoch: ctx.epoch,
            step: ctx.step,
            loss: ctx.loss,
            accuracy: ctx.accuracy,
            lr: ctx.lr,
            loss_scale: ctx.loss_scale,
            sparsity: ctx.sparsity,
            applied: None,
            grad_norm: None,
            monitored_loss: None,
            best_loss: None,
            val_accuracy: None,
        }
    }
}

/// Appends one record per step and per epoch to `metrics.jsonl`
#[derive(Debug)]
pub struct MetricsLog {
    out: JsonlWriter,
}

impl MetricsLog {
    /// Open (append) `log_dir/metrics.jsonl`.
    pub fn create(log_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self { out: JsonlWriter::open(log_dir.as_ref(), METRICS_FILE)? })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        self.out.path()
    }
}

impl Observer for MetricsLog {
    fn on_step_end(&mut self, ctx: &ObserverContext) -> Result<ObserverAction> {
        let mut record = MetricsRecord::new(MetricsEvent::Step, ctx);
        record.applied = Some(ctx.applied);
        record.grad_norm = ctx.grad_norm;
        self.out.append(&record)?;
        Ok(ObserverAction::Continue)
    }

    fn on_epoch_end(&mut self, ctx: &ObserverContext) -> Result<ObserverAction> {
        let mut record = MetricsRecord::new(MetricsEvent::Epoch, ctx);
        record.monitored_loss = ctx.monitored_loss;
        record.best_loss = ctx.best_loss;
        record.val_accuracy = ctx.val_accuracy;
        self.out.append(&record)?;
        self.out.flush()?;
        Ok(ObserverAction::Continue)
    }

    fn on_train_end(&mut self, _ctx: &ObserverContext) -> Result<()> {
        self.out.flush()
    }

    fn name(&self) -> &'static str {
        "MetricsLog"
    }
}
