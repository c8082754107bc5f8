//! Progressive block-magnitude pruning
//!
//! The Sparsification Controller of a training run:
//!
//! - **Schedules**: constant, linear and polynomial-decay sparsity targets
//! - **Block masks**: lowest-magnitude blocks zeroed under avg or max pooling
//! - **PrunableModel**: masked forward/backward and permanent finalization
//! - **Export**: SafeTensors weights plus a sparsity metadata sidecar
//!
//! # Example
//!
//! ```
//! use podar::prune::{BlockPooling, BlockShape, PruningConfig, SparsitySchedule};
//!
//! let schedule = SparsitySchedule::polynomial_decay(0.0, 0.5, 0, 9999).unwrap();
//! let config = PruningConfig::new(schedule)
//!     .with_block(BlockShape::new(1, 16))
//!     .with_pooling(BlockPooling::Avg);
//! assert!(config.validate().is_ok());
//! ```
//!
//! # References
//!
//! - Han, S., et al. (2015). Learning both weights and connections. NeurIPS.
//! - Zhu, M., & Gupta, S. (2017). To prune, or not to prune. arXiv:1710.01878.

mod config;
mod export;
mod mask;
mod prunable;
mod schedule;

#[cfg(test)]
mod proptests;

pub use config::{BlockPooling, BlockShape, PruningConfig};
pub use export::{
    export_sparse_model, SparseExportResult, SparsityMetadata, TensorSparsityInfo,
    SPARSITY_METADATA_FILE,
};
pub use mask::{mask_sparsity, update_block_mask};
pub use prunable::{MaskUpdate, PrunableModel};
pub use schedule::{ScheduleShape, ScheduleSpec, SparsitySchedule, DEFAULT_FREQUENCY, DEFAULT_POWER};
