//! Named trainable parameter.

use ndarray::Array2;

/// A named weight matrix of a [`LanguageModel`](super::LanguageModel).
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Tensor name used in exported artifacts
    pub name: String,
    /// Current value (f32 master weights)
    pub value: Array2<f32>,
    /// Whether the Sparsification Controller may mask this parameter
    pub prunable: bool,
}

impl Parameter {
    /// Create a prunable parameter
    pub fn prunable(name: impl Into<String>, value: Array2<f32>) -> Self {
        Self { name: name.into(), value, prunable: true }
    }

    /// Create a parameter that is never pruned (biases, norms)
    pub fn dense(name: impl Into<String>, value: Array2<f32>) -> Self {
        Self { name: name.into(), value, prunable: false }
    }

    /// Number of scalar elements
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Whether the parameter holds no elements
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Shape as `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        self.value.dim()
    }

    /// Fraction of exactly-zero entries
    pub fn zero_fraction(&self) -> f32 {
        if self.value.is_empty() {
            return 0.0;
        }
        let zeros = self.value.iter().filter(|&&v| v == 0.0).count();
        zeros as f32 / self.value.len() as f32
    }
}
