//! Dynamic loss scaler for fp16 training.

use ndarray::Array2;

use super::MixedPrecisionConfig;

/// Loss scaler with overflow backoff and periodic growth
///
/// The loss is multiplied by `scale` before the backward pass so small
/// gradients survive fp16 rounding; gradients are divided by it again after
/// the all-reduce. A non-finite gradient skips the step and halves the scale.
#[derive(Debug, Clone)]
pub struct GradScaler {
    scale: f32,
    growth_factor: f32,
    backoff_factor: f32,
    pub(crate) growth_interval: usize,
    steps_since_growth: usize,
    dynamic: bool,
    overflow_count: usize,
    successful_steps: usize,
}

impl GradScaler {
    /// Scaler built from a mixed-precision configuration
    pub fn from_config(config: &MixedPrecisionConfig) -> Self {
        Self {
            scale: config.initial_scale,
            growth_factor: config.scale_growth_factor,
            backoff_factor: config.scale_backoff_factor,
            growth_interval: config.scale_growth_interval.max(1),
            steps_since_growth: 0,
            dynamic: config.dynamic_scaling,
            overflow_count: 0,
            successful_steps: 0,
        }
    }

    /// Scaler that never scales (fp32 / bf16)
    pub fn disabled() -> Self {
        Self::from_config(&MixedPrecisionConfig::default())
    }

    /// Current loss scale
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Whether dynamic scaling is active
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Divide gradients by the loss scale in place.
    ///
    /// Returns `false` if any gradient is non-finite.
    pub fn unscale_and_check(&self, grads: &mut [Array2<f32>]) -> bool {
        let inv_scale = 1.0 / self.scale;
        let mut finite = true;
        for grad in grads.iter_mut() {
            grad.mapv_inplace(|g| {
                let g = g * inv_scale;
                finite &= g.is_finite();
                g
            });
        }
        finite
    }

    /// Record the outcome of a step and adjust the scale.
    pub fn update(&mut self, grads_valid: bool) {
        if grads_valid {
            self.successful_steps += 1;
        } else {
            self.overflow_count += 1;
        }
        if !self.dynamic {
            return;
        }

        if grads_valid {
            self.steps_since_growth += 1;
            if self.steps_since_growth >= self.growth_interval {
                self.scale *= self.growth_factor;
                self.steps_since_growth = 0;
            }
        } else {
            self.scale = (self.scale * self.backoff_factor).max(1.0);
            self.steps_since_growth = 0;
        }
    }

    /// Number of skipped (overflowing) steps
    pub fn overflow_count(&self) -> usize {
        self.overflow_count
    }

    /// Number of applied steps
    pub fn successful_steps(&self) -> usize {
        self.successful_steps
    }
}

impl Default for GradScaler {
    fn default() -> Self {
        Self::disabled()
    }
}
