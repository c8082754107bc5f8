//! Stochastic Gradient Descent optimizer

use ndarray::{Array2, Zip};

use super::optimizer::{check_shapes, Optimizer};
use crate::error::Result;
use crate::model::Parameter;

/// SGD optimizer with optional momentum
#[derive(Debug, Clone)]
pub struct Sgd {
    lr: f32,
    momentum: f32,
    velocities: Vec<Array2<f32>>,
}

impl Sgd {
    /// Create a new SGD optimizer
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self { lr, momentum, velocities: Vec::new() }
    }
}

impl Optimizer for Sgd {
    fn apply(&mut self, params: &mut [Parameter], grads: &[Array2<f32>]) -> Result<()> {
        check_shapes(params, grads)?;

        if self.momentum == 0.0 {
            for (param, grad) in params.iter_mut().zip(grads) {
                param.value.scaled_add(-self.lr, grad);
            }
            return Ok(());
        }

        if self.velocities.len() != params.len() {
            self.velocities = params.iter().map(|p| Array2::zeros(p.value.dim())).collect();
        }
        let (lr, momentum) = (self.lr, self.momentum);
        for ((param, grad), velocity) in params.iter_mut().zip(grads).zip(&mut self.velocities) {
            // v = momentum * v - lr * g; w += v
            Zip::from(&mut param.value).and(velocity).and(grad).for_each(|w, v, &g| {
                *v = momentum * *v - lr * g;
                *w += *v;
            });
        }
        Ok(())
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn name(&self) -> &'static str {
        "sgd"
    }
}
