//! Distributed Gradient Coordinator
//!
//! Wraps a base [`Optimizer`] so that every update is computed from the
//! gradient averaged over the whole worker group. All workers feed the
//! identical averaged gradient into identical optimizer state, so replicas
//! that start equal stay equal.

use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, warn};

use super::collective::{Collective, ReduceOp};
use crate::error::{Error, Result};
use crate::model::Parameter;
use crate::optim::{clip_grad_norm, Optimizer};
use crate::precision::{GradScaler, Precision};
use crate::runtime::{GradientCompression, RuntimeConfiguration};

/// What happened to one call of [`DistributedOptimizer::apply_gradients`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepReport {
    /// Whether the base optimizer was invoked
    pub applied: bool,
    /// Loss scale the gradients were computed with
    pub loss_scale: f32,
    /// Global norm of the averaged gradient, when finite
    pub grad_norm: Option<f32>,
}

/// Base optimizer plus the collective that keeps the group in lock step.
pub struct DistributedOptimizer<C: Collective> {
    inner: Box<dyn Optimizer>,
    collective: C,
    scaler: GradScaler,
    compression: GradientCompression,
    clip_norm: Option<f32>,
    flat: Vec<f32>,
}

impl<C: Collective> DistributedOptimizer<C> {
    /// Wrap `inner`; loss scaling and gradient compression follow `runtime`.
    pub fn wrap(inner: Box<dyn Optimizer>, collective: C, runtime: &RuntimeConfiguration) -> Self {
        Self {
            inner,
            collective,
            scaler: GradScaler::from_config(&runtime.mixed_precision()),
            compression: runtime.compression(),
            clip_norm: None,
            flat: Vec::new(),
        }
    }

    /// Clip the averaged gradient to a maximum global norm.
    pub fn with_clip_norm(mut self, clip_norm: Option<f32>) -> Self {
        self.clip_norm = clip_norm;
        self
    }

    /// Loss scale to multiply the next loss by before backpropagation.
    pub fn loss_scale(&self) -> f32 {
        self.scaler.scale()
    }

    /// Loss scaler state
    pub fn scaler(&self) -> &GradScaler {
        &self.scaler
    }

    pub fn lr(&self) -> f32 {
        self.inner.lr()
    }

    pub fn set_lr(&mut self, lr: f32) {
        self.inner.set_lr(lr);
    }

    pub fn collective(&self) -> &C {
        &self.collective
    }

    pub fn collective_mut(&mut self) -> &mut C {
        &mut self.collective
    }

    /// Average `local_grads` across the group and apply the result.
    ///
    /// Blocks until every worker has submitted its gradients for the same
    /// step. Gradients are expected to carry the current loss scale; they
    /// are unscaled after the average, and a non-finite average skips the
    /// update on every worker alike.
    ///
    /// # Errors
    ///
    /// Collective failures ([`Error::CoordinationTimeout`],
    /// [`Error::Coordination`]) and shape mismatches.
    pub fn apply_gradients(
        &mut self,
        params: &mut [Parameter],
        mut local_grads: Vec<Array2<f32>>,
    ) -> Result<StepReport> {
        let loss_scale = self.scaler.scale();
        self.flatten(&local_grads);
        self.collective.all_reduce(&mut self.flat, ReduceOp::Mean)?;
        self.unflatten(&mut local_grads)?;

        let finite = self.scaler.unscale_and_check(&mut local_grads);
        let mut grad_norm = None;
        if finite {
            let norm = match self.clip_norm {
                Some(max_norm) => clip_grad_norm(&mut local_grads, max_norm),
                None => global_norm(&local_grads),
            };
            grad_norm = Some(norm);
            self.inner.apply(params, &local_grads)?;
        } else {
            warn!(
                rank = self.collective.rank(),
                loss_scale, "non-finite averaged gradient, skipping update"
            );
        }
        self.scaler.update(finite);
        debug!(rank = self.collective.rank(), applied = finite, ?grad_norm, "gradient step");

        Ok(StepReport { applied: finite, loss_scale, grad_norm })
    }

    /// Overwrite every worker's parameters with `root`'s.
    pub fn broadcast_parameters(&mut self, params: &mut [Parameter], root: usize) -> Result<()> {
        let values: Vec<Array2<f32>> = params.iter().map(|p| p.value.clone()).collect();
        let compression = std::mem::replace(&mut self.compression, GradientCompression::None);
        self.flatten(&values);
        self.compression = compression;

        self.collective.broadcast(&mut self.flat, root)?;

        let mut offset = 0;
        for param in params.iter_mut() {
            let n = param.value.len();
            param
                .value
                .iter_mut()
                .zip(&self.flat[offset..offset + n])
                .for_each(|(w, &v)| *w = v);
            offset += n;
        }
        Ok(())
    }

    /// All-reduce a single value (losses, votes).
    pub fn all_reduce_scalar(&mut self, value: f32, op: ReduceOp) -> Result<f32> {
        let mut buf = [value];
        self.collective.all_reduce(&mut buf, op)?;
        Ok(buf[0])
    }

    fn flatten(&mut self, grads: &[Array2<f32>]) {
        self.flat.clear();
        self.flat.extend(grads.iter().flat_map(|g| g.iter().copied()));
        if self.compression == GradientCompression::Fp16 {
            self.flat.iter_mut().for_each(|g| *g = Precision::MixedFp16.round(*g));
        }
    }

    fn unflatten(&self, grads: &mut [Array2<f32>]) -> Result<()> {
        let total: usize = grads.iter().map(Array2::len).sum();
        if total != self.flat.len() {
            return Err(Error::Coordination(format!(
                "averaged gradient has {} values, expected {total}",
                self.flat.len()
            )));
        }
        let mut offset = 0;
        for grad in grads.iter_mut() {
            let n = grad.len();
            grad.iter_mut().zip(&self.flat[offset..offset + n]).for_each(|(g, &v)| *g = v);
            offset += n;
        }
        Ok(())
    }
}

fn global_norm(grads: &[Array2<f32>]) -> f32 {
    grads.iter().flat_map(|g| g.iter()).map(|&g| g * g).sum::<f32>().sqrt()
}
