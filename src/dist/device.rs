//! Compute device discovery and per-worker binding
//!
//! Accelerators are detected through `CUDA_VISIBLE_DEVICES` or `nvidia-smi`,
//! with a CPU fallback when the run does not require one.

use std::fmt;
use std::process::Command;
use tracing::{info, warn};

use super::WorkerContext;
use crate::error::{Error, Result};
use crate::runtime::{MemoryPolicy, RuntimeConfiguration};

/// Compute device for training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeDevice {
    /// CPU-only execution
    Cpu,
    /// CUDA GPU with device ID
    Cuda { device_id: usize },
}

impl ComputeDevice {
    /// Accelerators visible to this process, in device-index order.
    ///
    /// Empty when none are found.
    #[must_use]
    pub fn discover() -> Vec<Self> {
        if let Ok(visible) = std::env::var("CUDA_VISIBLE_DEVICES") {
            return Self::from_visible_devices(&visible);
        }
        Self::from_nvidia_smi().unwrap_or_default()
    }

    /// Parse a `CUDA_VISIBLE_DEVICES` value.
    ///
    /// Visible devices are renumbered from 0 by the driver; parsing stops at
    /// the first invalid entry the same way the driver does.
    pub fn from_visible_devices(value: &str) -> Vec<Self> {
        value
            .split(',')
            .map(str::trim)
            .take_while(|entry| !entry.is_empty() && !entry.starts_with('-'))
            .enumerate()
            .map(|(device_id, _)| Self::Cuda { device_id })
            .collect()
    }

    fn from_nvidia_smi() -> Option<Vec<Self>> {
        let output = Command::new("nvidia-smi")
            .args(["--query-gpu=index", "--format=csv,noheader"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Some(
            stdout
                .lines()
                .filter_map(|line| line.trim().parse().ok())
                .map(|device_id| Self::Cuda { device_id })
                .collect(),
        )
    }

    /// Check if this device is CUDA
    #[must_use]
    pub const fn is_cuda(&self) -> bool {
        matches!(self, Self::Cuda { .. })
    }

    /// Get device ID for CUDA devices
    #[must_use]
    pub const fn device_id(&self) -> Option<usize> {
        match self {
            Self::Cuda { device_id } => Some(*device_id),
            Self::Cpu => None,
        }
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU"),
            Self::Cuda { device_id } => write!(f, "CUDA:{device_id}"),
        }
    }
}

/// A worker's exclusive claim on one compute device.
///
/// Obtained from [`DeviceBinding::bind`] before any model state is
/// allocated; the model is constructed against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundDevice {
    device: ComputeDevice,
    memory: MemoryPolicy,
}

impl BoundDevice {
    /// Unbound CPU device for tests and single-process tools.
    pub fn cpu() -> Self {
        Self { device: ComputeDevice::Cpu, memory: MemoryPolicy::Growth }
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    pub fn memory_policy(&self) -> MemoryPolicy {
        self.memory
    }
}

/// Maps workers onto devices.
pub struct DeviceBinding;

impl DeviceBinding {
    /// Bind the calling worker to `available[local_rank mod len]`.
    ///
    /// Workers sharing a host must each get their own device, so more local
    /// workers than devices is rejected. Without accelerators the worker
    /// falls back to the CPU unless the runtime requires one.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if an accelerator is required but none is
    /// available, or if the host has fewer devices than local workers.
    pub fn bind(
        ctx: &WorkerContext,
        runtime: &RuntimeConfiguration,
        available: &[ComputeDevice],
    ) -> Result<BoundDevice> {
        if available.is_empty() {
            if runtime.require_accelerator() {
                return Err(Error::Configuration(format!(
                    "{ctx}: an accelerator is required but none is available"
                )));
            }
            warn!(rank = ctx.rank(), "no accelerator found, falling back to CPU");
            return Ok(BoundDevice { device: ComputeDevice::Cpu, memory: runtime.memory() });
        }

        if ctx.local_size() > available.len() {
            return Err(Error::Configuration(format!(
                "{} workers on this host but only {} devices; devices cannot be shared",
                ctx.local_size(),
                available.len()
            )));
        }

        let device = available[ctx.local_device_index() % available.len()];
        info!(rank = ctx.rank(), %device, memory = ?runtime.memory(), "bound worker to device");
        Ok(BoundDevice { device, memory: runtime.memory() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpus(n: usize) -> Vec<ComputeDevice> {
        (0..n).map(|device_id| ComputeDevice::Cuda { device_id }).collect()
    }

    #[test]
    fn test_bind_by_local_rank() {
        let ctx = WorkerContext::with_local(5, 8, 1, 4).unwrap();
        let bound = DeviceBinding::bind(&ctx, &RuntimeConfiguration::default(), &gpus(4)).unwrap();
        assert_eq!(bound.device(), ComputeDevice::Cuda { device_id: 1 });
        assert_eq!(bound.memory_policy(), MemoryPolicy::Growth);
    }

    #[test]
    fn test_local_workers_get_distinct_devices() {
        let devices = gpus(4);
        let bound: Vec<_> = (0..4)
            .map(|r| {
                let ctx = WorkerContext::new(r, 4).unwrap();
                DeviceBinding::bind(&ctx, &RuntimeConfiguration::default(), &devices)
                    .unwrap()
                    .device()
            })
            .collect();
        let unique: std::collections::HashSet<_> = bound.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn test_oversubscription_rejected() {
        let ctx = WorkerContext::new(0, 4).unwrap();
        let err = DeviceBinding::bind(&ctx, &RuntimeConfiguration::default(), &gpus(2)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_cpu_fallback_and_required_accelerator() {
        let ctx = WorkerContext::single();
        let bound = DeviceBinding::bind(&ctx, &RuntimeConfiguration::default(), &[]).unwrap();
        assert_eq!(bound.device(), ComputeDevice::Cpu);

        let strict = RuntimeConfiguration::default().with_require_accelerator(true);
        assert!(matches!(
            DeviceBinding::bind(&ctx, &strict, &[]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_visible_devices_parsing() {
        assert_eq!(ComputeDevice::from_visible_devices("3,5").len(), 2);
        assert_eq!(ComputeDevice::from_visible_devices("").len(), 0);
        assert_eq!(ComputeDevice::from_visible_devices("-1").len(), 0);
        assert_eq!(ComputeDevice::from_visible_devices("0,-1,2").len(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(ComputeDevice::Cpu.to_string(), "CPU");
        assert_eq!(ComputeDevice::Cuda { device_id: 2 }.to_string(), "CUDA:2");
    }
}
