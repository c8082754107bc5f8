//! Process-wide runtime configuration.
//!
//! Built once at start-up and passed by reference to Device Binding, the
//! Distributed Gradient Coordinator and the Training Driver. Nothing mutates
//! it afterwards.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::precision::{MixedPrecisionConfig, Precision};

/// Default bound on how long a worker waits for its peers.
pub const DEFAULT_COORDINATION_TIMEOUT: Duration = Duration::from_secs(300);

/// How device memory is claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPolicy {
    /// Allocate on demand; never reserve the whole device up front.
    #[default]
    Growth,
    /// Reserve the device memory at bind time.
    Preallocate,
}

/// Encoding of gradients while they are exchanged between workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientCompression {
    /// Exchange full f32 gradients.
    #[default]
    None,
    /// Round gradients to fp16 before the all-reduce.
    Fp16,
}

/// Immutable runtime settings shared by all components of a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfiguration {
    precision: Precision,
    memory: MemoryPolicy,
    require_accelerator: bool,
    coordination_timeout: Duration,
    compression: GradientCompression,
}

impl RuntimeConfiguration {
    /// Full-precision, growth-on-demand defaults.
    pub fn new() -> Self {
        Self {
            precision: Precision::Fp32,
            memory: MemoryPolicy::Growth,
            require_accelerator: false,
            coordination_timeout: DEFAULT_COORDINATION_TIMEOUT,
            compression: GradientCompression::None,
        }
    }

    /// Set the compute precision policy.
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Set the memory policy.
    pub fn with_memory(mut self, memory: MemoryPolicy) -> Self {
        self.memory = memory;
        self
    }

    /// Fail device binding when no accelerator is available.
    pub fn with_require_accelerator(mut self, required: bool) -> Self {
        self.require_accelerator = required;
        self
    }

    /// Bound the time a collective call may wait for peers.
    pub fn with_coordination_timeout(mut self, timeout: Duration) -> Self {
        self.coordination_timeout = timeout;
        self
    }

    /// Set gradient compression for the all-reduce.
    pub fn with_compression(mut self, compression: GradientCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn memory(&self) -> MemoryPolicy {
        self.memory
    }

    pub fn require_accelerator(&self) -> bool {
        self.require_accelerator
    }

    pub fn coordination_timeout(&self) -> Duration {
        self.coordination_timeout
    }

    pub fn compression(&self) -> GradientCompression {
        self.compression
    }

    /// Loss-scaling settings implied by the precision policy.
    pub fn mixed_precision(&self) -> MixedPrecisionConfig {
        MixedPrecisionConfig::for_precision(self.precision)
    }
}

impl Default for RuntimeConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let rt = RuntimeConfiguration::default();
        assert_eq!(rt.precision(), Precision::Fp32);
        assert_eq!(rt.memory(), MemoryPolicy::Growth);
        assert!(!rt.require_accelerator());
        assert_eq!(rt.coordination_timeout(), DEFAULT_COORDINATION_TIMEOUT);
        assert_eq!(rt.compression(), GradientCompression::None);
        assert!(!rt.mixed_precision().is_mixed());
    }

    #[test]
    fn test_builder() {
        let rt = RuntimeConfiguration::new()
            .with_precision(Precision::MixedFp16)
            .with_coordination_timeout(Duration::from_secs(5))
            .with_compression(GradientCompression::Fp16);
        assert!(rt.mixed_precision().dynamic_scaling);
        assert_eq!(rt.coordination_timeout(), Duration::from_secs(5));
        assert_eq!(rt.compression(), GradientCompression::Fp16);
    }
}
