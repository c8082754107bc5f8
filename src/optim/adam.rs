//! Adam optimizer with optional decoupled weight decay (AdamW)

use ndarray::{Array2, Zip};

use super::optimizer::{check_shapes, Optimizer};
use crate::error::Result;
use crate::model::Parameter;

/// Adam optimizer
///
/// With `weight_decay > 0` the decay is applied directly to the weights
/// (AdamW): θ_t = (1 - lr * λ) * θ_{t-1} - lr_t * m_t / (√v_t + ε)
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    t: u64,
    m: Vec<Array2<f32>>,
    v: Vec<Array2<f32>>,
}

impl Adam {
    /// Create a new Adam optimizer
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self { lr, beta1, beta2, epsilon, weight_decay: 0.0, t: 0, m: Vec::new(), v: Vec::new() }
    }

    /// Create Adam with default parameters
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }

    /// Enable decoupled weight decay
    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    /// Number of updates applied so far
    pub fn step_count(&self) -> u64 {
        self.t
    }

    fn ensure_moments(&mut self, params: &[Parameter]) {
        if self.m.len() != params.len() {
            self.m = params.iter().map(|p| Array2::zeros(p.value.dim())).collect();
            self.v = params.iter().map(|p| Array2::zeros(p.value.dim())).collect();
        }
    }
}

impl Optimizer for Adam {
    fn apply(&mut self, params: &mut [Parameter], grads: &[Array2<f32>]) -> Result<()> {
        check_shapes(params, grads)?;
        self.ensure_moments(params);
        self.t += 1;

        // Bias correction folded into the step size
        let t = i32::try_from(self.t).unwrap_or(i32::MAX);
        let lr_t = self.lr * ((1.0 - self.beta2.powi(t)).sqrt() / (1.0 - self.beta1.powi(t)));
        let decay = 1.0 - self.lr * self.weight_decay;
        let (beta1, beta2, eps) = (self.beta1, self.beta2, self.epsilon);

        for (i, (param, grad)) in params.iter_mut().zip(grads).enumerate() {
            Zip::from(&mut param.value)
                .and(&mut self.m[i])
                .and(&mut self.v[i])
                .and(grad)
                .for_each(|w, m, v, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *w = *w * decay - lr_t * *m / (v.sqrt() + eps);
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
        if self.weight_decay > 0.0 {
            "adamw"
        } else {
            "adam"
        }
    }
}
