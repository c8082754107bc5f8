//! Error types for podar
//!
//! Every failure a worker can hit maps onto one [`Error`] variant. Only
//! [`Error::EndOfShard`] is recoverable; the Training Driver consumes it as
//! an epoch boundary. Everything else terminates the whole process group.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for podar operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error category reported to the user when a run terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid rank/group/device or configuration setup
    Configuration,
    /// A shard ran out of batches
    EndOfShard,
    /// A worker did not reach the barrier in time
    CoordinationTimeout,
    /// A sparsity schedule would decrease
    ScheduleInvariant,
    /// Workers disagree about the collective protocol state
    Coordination,
    /// Dataset or tokenization problem
    Data,
    /// Filesystem or socket I/O
    Io,
    /// Encoding or decoding of configs and artifacts
    Serialization,
}

/// Errors that can occur while configuring or running a training worker.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("End of shard for rank {rank} after {batches} batches")]
    EndOfShard { rank: usize, batches: usize },

    #[error(
        "Coordination timeout on rank {rank} at round {round} after {waited:?}: {detail}"
    )]
    CoordinationTimeout {
        rank: usize,
        round: u64,
        waited: Duration,
        detail: String,
    },

    #[error("Sparsity schedule invariant violated: {0}")]
    ScheduleInvariant(String),

    #[error("Coordination failure: {0}")]
    Coordination(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("IO error: {context}\n  Cause: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }

    /// Category of this error, used for the final run report.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::EndOfShard { .. } => ErrorCategory::EndOfShard,
            Self::CoordinationTimeout { .. } => ErrorCategory::CoordinationTimeout,
            Self::ScheduleInvariant(_) => ErrorCategory::ScheduleInvariant,
            Self::Coordination(_) => ErrorCategory::Coordination,
            Self::Data(_) => ErrorCategory::Data,
            Self::Io { .. } => ErrorCategory::Io,
            Self::Serialization(_) => ErrorCategory::Serialization,
        }
    }

    /// Whether the Training Driver may absorb this error and keep running.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::EndOfShard { .. })
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
