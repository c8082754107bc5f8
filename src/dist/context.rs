//! Per-process identity within the worker group.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Identity of one worker inside a fixed-size group.
///
/// Created once at process start from the launcher's assignment and never
/// mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerContext {
    rank: usize,
    group_size: usize,
    local_rank: usize,
    local_size: usize,
}

impl WorkerContext {
    /// Create a context for a group that runs on a single host
    /// (local rank equals rank).
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if `group_size == 0` or `rank >= group_size`.
    pub fn new(rank: usize, group_size: usize) -> Result<Self> {
        Self::with_local(rank, group_size, rank, group_size)
    }

    /// Create a context with an explicit host-local rank.
    ///
    /// `local_rank` selects the accelerator on this host and `local_size`
    /// is the number of workers sharing the host.
    pub fn with_local(
        rank: usize,
        group_size: usize,
        local_rank: usize,
        local_size: usize,
    ) -> Result<Self> {
        if group_size == 0 {
            return Err(Error::Configuration("group size must be positive".to_string()));
        }
        if rank >= group_size {
            return Err(Error::Configuration(format!(
                "rank {rank} is out of range for a group of {group_size} workers"
            )));
        }
        if local_size == 0 || local_size > group_size {
            return Err(Error::Configuration(format!(
                "local size {local_size} must be in 1..={group_size}"
            )));
        }
        if local_rank >= local_size {
            return Err(Error::Configuration(format!(
                "local rank {local_rank} is out of range for {local_size} local workers"
            )));
        }
        Ok(Self { rank, group_size, local_rank, local_size })
    }

    /// Context of a single-worker run.
    pub fn single() -> Self {
        Self { rank: 0, group_size: 1, local_rank: 0, local_size: 1 }
    }

    /// Unique rank in `[0, group_size)`.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of workers in the group.
    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// Index used to pick this worker's device on its host.
    pub fn local_device_index(&self) -> usize {
        self.local_rank
    }

    /// Number of workers on this host.
    pub fn local_size(&self) -> usize {
        self.local_size
    }

    /// Rank 0 persists artifacts and writes summaries.
    pub fn is_primary(&self) -> bool {
        self.rank == 0
    }

    /// Whether more than one worker takes part.
    pub fn is_distributed(&self) -> bool {
        self.group_size > 1
    }
}

impl fmt::Display for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rank {}/{} (local {})", self.rank, self.group_size, self.local_rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_context() {
        let ctx = WorkerContext::with_local(5, 8, 1, 4).unwrap();
        assert_eq!(ctx.rank(), 5);
        assert_eq!(ctx.group_size(), 8);
        assert_eq!(ctx.local_device_index(), 1);
        assert!(!ctx.is_primary());
        assert!(ctx.is_distributed());
    }

    #[test]
    fn test_rank_out_of_range_is_configuration_error() {
        let err = WorkerContext::new(4, 4).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_empty_group_rejected() {
        assert!(WorkerContext::new(0, 0).is_err());
    }

    #[test]
    fn test_local_rank_checked() {
        assert!(WorkerContext::with_local(0, 4, 2, 2).is_err());
        assert!(WorkerContext::with_local(0, 4, 0, 5).is_err());
    }

    #[test]
    fn test_single() {
        let ctx = WorkerContext::single();
        assert!(ctx.is_primary());
        assert!(!ctx.is_distributed());
        assert_eq!(ctx.to_string(), "rank 0/1 (local 0)");
    }
}
