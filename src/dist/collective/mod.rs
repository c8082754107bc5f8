//! Collective communication between the workers of a group
//!
//! Every call is a numbered round that blocks until all `world_size`
//! workers have entered the same round. Waiting is bounded by the
//! configured coordination timeout; a worker that does not show up in
//! time fails the round for everybody with
//! [`Error::CoordinationTimeout`](crate::Error::CoordinationTimeout).
//!
//! Backends:
//! - [`SingleProcess`]: group of one, every call returns immediately
//! - [`LocalGroup`]: worker threads of one process (condvar barrier)
//! - [`TcpCollective`]: worker processes joined through a TCP hub at rank 0

mod local;
mod tcp;


pub use local::{LocalGroup, LocalMember};
pub use tcp::TcpCollective;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Element-wise reduction applied by [`Collective::all_reduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceOp {
    Sum,
    Mean,
    Min,
    Max,
}

impl ReduceOp {
    /// Fold `value` into the running accumulator.
    pub(crate) fn combine(self, acc: &mut [f32], value: &[f32]) {
        for (a, &v) in acc.iter_mut().zip(value) {
            *a = match self {
                ReduceOp::Sum | ReduceOp::Mean => *a + v,
                ReduceOp::Min => a.min(v),
                ReduceOp::Max => a.max(v),
            };
        }
    }

    /// Turn the accumulator into the final result for a group of `n`.
    pub(crate) fn finish(self, acc: &mut [f32], n: usize) {
        if self == ReduceOp::Mean {
            let inv = 1.0 / n as f32;
            acc.iter_mut().for_each(|a| *a *= inv);
        }
    }
}

/// Blocking group communication used by the Distributed Gradient Coordinator.
pub trait Collective: Send {
    /// Rank of the calling worker.
    fn rank(&self) -> usize;

    /// Number of workers in the group.
    fn world_size(&self) -> usize;

    /// Number of completed rounds.
    fn round(&self) -> u64;

    /// Replace `buf` on every worker with the element-wise reduction of all
    /// workers' buffers. All workers must pass buffers of equal length.
    fn all_reduce(&mut self, buf: &mut [f32], op: ReduceOp) -> Result<()>;

    /// Replace `buf` on every worker with `root`'s buffer.
    fn broadcast(&mut self, buf: &mut [f32], root: usize) -> Result<()>;

    /// Block until every worker reaches the barrier.
    fn barrier(&mut self) -> Result<()> {
        self.all_reduce(&mut [], ReduceOp::Sum)
    }

    /// Tell the peers this worker is gone so they fail fast instead of
    /// waiting out the timeout.
    fn abort(&mut self, _reason: &str) {}
}

impl<C: Collective + ?Sized> Collective for Box<C> {
    fn rank(&self) -> usize {
        (**self).rank()
    }

    fn world_size(&self) -> usize {
        (**self).world_size()
    }

    fn round(&self) -> u64 {
        (**self).round()
    }

    fn all_reduce(&mut self, buf: &mut [f32], op: ReduceOp) -> Result<()> {
        (**self).all_reduce(buf, op)
    }

    fn broadcast(&mut self, buf: &mut [f32], root: usize) -> Result<()> {
        (**self).broadcast(buf, root)
    }

    fn barrier(&mut self) -> Result<()> {
        (**self).barrier()
    }

    fn abort(&mut self, reason: &str) {
        (**self).abort(reason);
    }
}

/// Group of exactly one worker.
#[derive(Debug, Default)]
pub struct SingleProcess {
    round: u64,
}

impl SingleProcess {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Collective for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn round(&self) -> u64 {
        self.round
    }

    fn all_reduce(&mut self, _buf: &mut [f32], _op: ReduceOp) -> Result<()> {
        // the mean over one worker is the worker's own value
        self.round += 1;
        Ok(())
    }

    fn broadcast(&mut self, _buf: &mut [f32], root: usize) -> Result<()> {
        check_root(root, 1)?;
        self.round += 1;
        Ok(())
    }
}

pub(crate) fn check_root(root: usize, world_size: usize) -> Result<()> {
    if root >= world_size {
        return Err(Error::Configuration(format!(
            "broadcast root {root} is outside a group of {world_size}"
        )));
    }
    Ok(())
}
