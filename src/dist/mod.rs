//! Distributed execution: worker identity, device binding, collectives and
//! the gradient-averaging optimizer wrapper.

pub mod collective;
mod context;
mod device;
mod optimizer;

pub use collective::{Collective, LocalGroup, LocalMember, ReduceOp, SingleProcess, TcpCollective};
pub use context::WorkerContext;
pub use device::{BoundDevice, ComputeDevice, DeviceBinding};
pub use optimizer::{DistributedOptimizer, StepReport};
