//! Data Shard Provider
//!
//! Loads text records, partitions them across ranks and turns each rank's
//! share into lazily tokenized batches.

mod batch;
mod record;
mod shard;

#[cfg(test)]
mod proptests;

pub use batch::Batch;
pub use record::{load_jsonl, TextRecord};
pub use shard::{make_shard, Shard, ShardPolicy, ShardedDataset};
