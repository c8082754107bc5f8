//! Configuration for mixed-precision training.

use super::Precision;

/// Default number of successful steps before the loss scale is increased
pub const DEFAULT_SCALE_GROWTH_INTERVAL: usize = 2000;

/// Loss-scaling configuration derived from a [`Precision`] policy
#[derive(Debug, Clone)]
pub struct MixedPrecisionConfig {
    /// Precision for activations and gradients
    pub compute_precision: Precision,
    /// Initial loss scale factor
    pub initial_scale: f32,
    /// Factor to increase scale by on successful step
    pub scale_growth_factor: f32,
    /// Factor to decrease scale by on overflow
    pub scale_backoff_factor: f32,
    /// Number of successful steps before increasing scale
    pub scale_growth_interval: usize,
    /// Whether to use dynamic loss scaling
    pub dynamic_scaling: bool,
}

impl MixedPrecisionConfig {
    /// Loss-scaling settings appropriate for a precision policy.
    ///
    /// Only fp16 needs dynamic scaling; bf16 shares the f32 exponent range.
    pub fn for_precision(precision: Precision) -> Self {
        let (initial_scale, dynamic_scaling) = match precision {
            Precision::MixedFp16 => (65536.0, true),
            Precision::Fp32 | Precision::MixedBf16 => (1.0, false),
        };
        Self {
            compute_precision: precision,
            initial_scale,
            scale_growth_factor: 2.0,
            scale_backoff_factor: 0.5,
            scale_growth_interval: DEFAULT_SCALE_GROWTH_INTERVAL,
            dynamic_scaling,
        }
    }

    /// Check if mixed precision is enabled
    pub fn is_mixed(&self) -> bool {
        self.compute_precision.is_reduced()
    }

    /// Set initial loss scale
    pub fn with_initial_scale(mut self, scale: f32) -> Self {
        self.initial_scale = scale;
        self
    }
}

impl Default for MixedPrecisionConfig {
    fn default() -> Self {
        Self::for_precision(Precision::Fp32)
    }
}
