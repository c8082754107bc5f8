//! Language models trained by the orchestration loop
//!
//! [`LanguageModel`] is the contract the Training Driver and the
//! Sparsification Controller rely on: named `f32` parameter matrices, and a
//! forward/backward pass evaluated against an explicit set of weights so
//! that a masked view can be used without touching the stored values.

mod bigram;
mod io;
mod parameter;

pub use bigram::{BigramConfig, BigramLm};
pub use io::{load_safetensors, load_weights_into, save_safetensors};
pub use parameter::Parameter;

use ndarray::Array2;

use crate::data::Batch;
use crate::error::Result;
use crate::precision::Precision;

/// Loss and gradients of one batch.
#[derive(Debug, Clone)]
pub struct LossAndGrads {
    /// Mean loss over the batch's prediction targets (unscaled)
    pub loss: f32,
    /// Number of prediction targets in the batch
    pub targets: usize,
    /// Targets whose most probable prediction was the actual next token
    pub correct: usize,
    /// Gradient of `loss × loss_scale`, one per parameter
    pub grads: Vec<Array2<f32>>,
}

impl LossAndGrads {
    /// Next-token accuracy of the batch
    pub fn accuracy(&self) -> f32 {
        accuracy(self.correct, self.targets)
    }
}

/// Loss and next-token accuracy of one batch, without gradients.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Evaluation {
    /// Mean loss over the batch's prediction targets
    pub loss: f32,
    pub targets: usize,
    pub correct: usize,
}

impl Evaluation {
    pub fn accuracy(&self) -> f32 {
        accuracy(self.correct, self.targets)
    }
}

fn accuracy(correct: usize, targets: usize) -> f32 {
    if targets == 0 {
        0.0
    } else {
        correct as f32 / targets as f32
    }
}

/// A next-token prediction model.
pub trait LanguageModel: Send {
    /// Model parameters in a stable order
    fn parameters(&self) -> &[Parameter];

    /// Mutable access for optimizers and weight loading
    fn parameters_mut(&mut self) -> &mut [Parameter];

    /// Size of the token vocabulary
    fn vocab_size(&self) -> usize;

    /// Forward and backward pass using `weights` in place of the stored
    /// parameter values (same order and shapes as [`parameters`](Self::parameters)).
    ///
    /// Activations and gradients are rounded to `precision`; gradients are
    /// multiplied by `loss_scale` before rounding.
    fn loss_and_grads(
        &self,
        weights: &[Array2<f32>],
        batch: &Batch,
        precision: Precision,
        loss_scale: f32,
    ) -> Result<LossAndGrads>;

    /// Loss and accuracy of a batch, without gradients.
    fn evaluate(
        &self,
        weights: &[Array2<f32>],
        batch: &Batch,
        precision: Precision,
    ) -> Result<Evaluation>;

    /// Mean loss of a batch, without gradients.
    fn loss(&self, weights: &[Array2<f32>], batch: &Batch, precision: Precision) -> Result<f32> {
        Ok(self.evaluate(weights, batch, precision)?.loss)
    }

    /// Current parameter values, cloned
    fn weights(&self) -> Vec<Array2<f32>> {
        self.parameters().iter().map(|p| p.value.clone()).collect()
    }

    /// Total number of scalar parameters
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(Parameter::len).sum()
    }
}
