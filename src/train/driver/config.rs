//! Stopping criteria of the Training Driver

use crate::error::{Error, Result};

/// Budgets and early stopping settings of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Maximum number of epochs
    pub epochs: usize,
    /// Stop after this many epochs without improvement
    pub patience: Option<usize>,
    /// Minimum decrease of the monitored loss that counts as improvement
    pub min_delta: f32,
    /// Global step budget
    pub total_steps: Option<usize>,
    /// Cap on steps per epoch
    pub steps_per_epoch: Option<usize>,
}

impl DriverConfig {
    /// Run for `epochs` epochs, no early stopping.
    pub fn new(epochs: usize) -> Self {
        Self { epochs, patience: None, min_delta: 0.0, total_steps: None, steps_per_epoch: None }
    }

    /// Enable early stopping.
    pub fn with_patience(mut self, patience: usize, min_delta: f32) -> Self {
        self.patience = Some(patience);
        self.min_delta = min_delta;
        self
    }

    /// Stop as `Exhausted` once `total_steps` steps have run.
    pub fn with_total_steps(mut self, total_steps: usize) -> Self {
        self.total_steps = Some(total_steps);
        self
    }

    /// End each epoch after at most `steps` steps.
    pub fn with_steps_per_epoch(mut self, steps: usize) -> Self {
        self.steps_per_epoch = Some(steps);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::Configuration("epochs must be at least 1".into()));
        }
        if self.patience == Some(0) {
            return Err(Error::Configuration("patience must be at least 1".into()));
        }
        if self.total_steps == Some(0) || self.steps_per_epoch == Some(0) {
            return Err(Error::Configuration("step budgets must be positive".into()));
        }
        if self.min_delta.is_nan() || self.min_delta < 0.0 {
            return Err(Error::Configuration(format!(
                "min_delta ({}) must be non-negative",
                self.min_delta
            )));
        }
        Ok(())
    }
}
