//! Precision policy definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric policy for the forward/backward computation.
///
/// Master weights and optimizer state always stay in f32; the reduced
/// policies round weights and activations through 16-bit floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// 32-bit floating point everywhere (default)
    #[default]
    Fp32,
    /// IEEE half precision compute with dynamic loss scaling
    MixedFp16,
    /// Brain floating point compute
    MixedBf16,
}

impl Precision {
    /// Compute element size in bytes
    pub fn size_bytes(&self) -> usize {
        match self {
            Precision::Fp32 => 4,
            Precision::MixedFp16 | Precision::MixedBf16 => 2,
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Precision::Fp32 => "fp32",
            Precision::MixedFp16 => "mixed_fp16",
            Precision::MixedBf16 => "mixed_bf16",
        }
    }

    /// Whether this is a reduced precision policy
    pub fn is_reduced(&self) -> bool {
        matches!(self, Precision::MixedFp16 | Precision::MixedBf16)
    }

    /// Round a value to the compute precision, returned widened to f32.
    ///
    /// Values beyond the fp16 range become infinite, which is how loss
    /// scaling detects overflow.
    #[inline]
    pub fn round(&self, value: f32) -> f32 {
        match self {
            Precision::Fp32 => value,
            Precision::MixedFp16 => half::f16::from_f32(value).to_f32(),
            Precision::MixedBf16 => half::bf16::from_f32(value).to_f32(),
        }
    }

    /// Round every element of a slice in place.
    pub fn round_slice(&self, values: &mut [f32]) {
        if self.is_reduced() {
            for v in values.iter_mut() {
                *v = self.round(*v);
            }
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
