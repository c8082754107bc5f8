//! Optimizer trait

use ndarray::Array2;

use crate::error::{Error, Result};
use crate::model::Parameter;

/// Trait for optimization algorithms
///
/// Optimizers own their per-parameter state (moments, velocities) and are
/// handed the full parameter list together with one gradient per parameter,
/// in the same order, on every step.
pub trait Optimizer: Send {
    /// Apply one update: `params[i] -= f(grads[i])`
    fn apply(&mut self, params: &mut [Parameter], grads: &[Array2<f32>]) -> Result<()>;

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Check that gradients line up one-to-one with parameters.
pub(crate) fn check_shapes(params: &[Parameter], grads: &[Array2<f32>]) -> Result<()> {
    if params.len() != grads.len() {
        return Err(Error::Configuration(format!(
            "got {} gradients for {} parameters",
            grads.len(),
            params.len()
        )));
    }
    for (param, grad) in params.iter().zip(grads) {
        if param.value.dim() != grad.dim() {
            return Err(Error::Configuration(format!(
                "gradient shape {:?} does not match parameter '{}' {:?}",
                grad.dim(),
                param.name,
                param.value.dim()
            )));
        }
    }
    Ok(())
}
