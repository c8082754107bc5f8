//! Worker identity from launcher environment variables
//!
//! `podar launch` starts one process per rank and passes the assignment
//! through these variables; external launchers can set them as well.

use std::collections::HashMap;

use crate::dist::WorkerContext;
use crate::error::{Error, Result};

/// Global rank of the worker
pub const ENV_RANK: &str = "PODAR_RANK";
/// Number of workers in the group
pub const ENV_WORLD_SIZE: &str = "PODAR_WORLD_SIZE";
/// Rank among the workers on this host
pub const ENV_LOCAL_RANK: &str = "PODAR_LOCAL_RANK";
/// Number of workers on this host
pub const ENV_LOCAL_WORLD_SIZE: &str = "PODAR_LOCAL_WORLD_SIZE";
/// Rendezvous address of rank 0
pub const ENV_MASTER_ADDR: &str = "PODAR_MASTER_ADDR";

/// Launcher assignment read from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerEnv {
    pub rank: Option<usize>,
    pub world_size: Option<usize>,
    pub local_rank: Option<usize>,
    pub local_world_size: Option<usize>,
    pub master_addr: Option<String>,
}

impl WorkerEnv {
    /// Read the process environment.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read from an explicit map (tests, launch plans)
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let number = |key: &str| -> Result<Option<usize>> {
            lookup(key)
                .map(|raw| {
                    raw.trim().parse::<usize>().map_err(|e| {
                        Error::Configuration(format!("{key}={raw:?} is not a valid count: {e}"))
                    })
                })
                .transpose()
        };
        Ok(Self {
            rank: number(ENV_RANK)?,
            world_size: number(ENV_WORLD_SIZE)?,
            local_rank: number(ENV_LOCAL_RANK)?,
            local_world_size: number(ENV_LOCAL_WORLD_SIZE)?,
            master_addr: lookup(ENV_MASTER_ADDR).filter(|s| !s.trim().is_empty()),
        })
    }

    /// Overlay explicit values (e.g. command-line flags) on this assignment
    pub fn merged(self, overrides: WorkerEnv) -> Self {
        Self {
            rank: overrides.rank.or(self.rank),
            world_size: overrides.world_size.or(self.world_size),
            local_rank: overrides.local_rank.or(self.local_rank),
            local_world_size: overrides.local_world_size.or(self.local_world_size),
            master_addr: overrides.master_addr.or(self.master_addr),
        }
    }

    /// Worker context of this assignment; a single worker when nothing is set.
    ///
    /// Local rank and size default to the global ones (one host).
    pub fn context(&self) -> Result<WorkerContext> {
        let world_size = self.world_size.unwrap_or(1);
        let rank = match self.rank {
            Some(rank) => rank,
            None if world_size == 1 => 0,
            None => {
                return Err(Error::Configuration(format!(
                    "{ENV_WORLD_SIZE}={world_size} but {ENV_RANK} is not set"
                )))
            }
        };
        let local_world_size = self.local_world_size.unwrap_or(world_size);
        let local_rank = self.local_rank.unwrap_or(rank % local_world_size.max(1));
        WorkerContext::with_local(rank, world_size, local_rank, local_world_size)
    }

    /// Variables that hand this assignment to a child process
    pub fn to_vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = Vec::new();
        if let Some(v) = self.rank {
            vars.push((ENV_RANK, v.to_string()));
        }
        if let Some(v) = self.world_size {
            vars.push((ENV_WORLD_SIZE, v.to_string()));
        }
        if let Some(v) = self.local_rank {
            vars.push((ENV_LOCAL_RANK, v.to_string()));
        }
        if let Some(v) = self.local_world_size {
            vars.push((ENV_LOCAL_WORLD_SIZE, v.to_string()));
        }
        if let Some(v) = &self.master_addr {
            vars.push((ENV_MASTER_ADDR, v.clone()));
        }
        vars
    }
}
