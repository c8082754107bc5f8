//! Deterministic per-rank dataset partitioning and batching.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

use super::{Batch, TextRecord};
use crate::dist::WorkerContext;
use crate::error::{Error, Result};
use crate::tokenizer::Tokenizer;

/// How record indices are assigned to ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardPolicy {
    /// Record `i` belongs to rank `i mod group_size`.
    #[default]
    Interleave,
    /// Each rank owns one contiguous range; the first `len mod group_size`
    /// ranks get one extra record.
    Contiguous,
}

impl ShardPolicy {
    /// Indices of a `len`-record dataset owned by `ctx`'s rank, in order.
    pub fn indices(&self, len: usize, ctx: &WorkerContext) -> Vec<usize> {
        match self {
            ShardPolicy::Interleave => {
                (0..len).skip(ctx.rank()).step_by(ctx.group_size()).collect()
            }
            ShardPolicy::Contiguous => contiguous_range(len, ctx.rank(), ctx.group_size()).collect(),
        }
    }
}

fn contiguous_range(len: usize, rank: usize, size: usize) -> Range<usize> {
    let base = len / size;
    let extra = len % size;
    let start = rank * base + rank.min(extra);
    let count = base + usize::from(rank < extra);
    start..start + count
}

/// Build one rank's shard of `records` for a single pass.
///
/// Batches are produced lazily; records are only tokenized when the batch
/// containing them is requested. A trailing group smaller than
/// `batch_size` is dropped.
///
/// # Errors
///
/// [`Error::Configuration`] if `batch_size` is zero.
pub fn make_shard(
    records: Arc<[TextRecord]>,
    ctx: &WorkerContext,
    batch_size: usize,
    tokenizer: Arc<dyn Tokenizer>,
    policy: ShardPolicy,
) -> Result<Shard> {
    check_batch_size(batch_size)?;
    let indices = policy.indices(records.len(), ctx);
    Ok(Shard::new(records, indices, ctx.rank(), batch_size, tokenizer, false))
}

fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(Error::Configuration("batch_size must be positive".to_string()));
    }
    Ok(())
}

/// Lazily batched view of the records owned by one rank.
pub struct Shard {
    records: Arc<[TextRecord]>,
    indices: Vec<usize>,
    cursor: usize,
    rank: usize,
    batch_size: usize,
    batches_yielded: usize,
    keep_remainder: bool,
    tokenizer: Arc<dyn Tokenizer>,
}

impl Shard {
    fn new(
        records: Arc<[TextRecord]>,
        indices: Vec<usize>,
        rank: usize,
        batch_size: usize,
        tokenizer: Arc<dyn Tokenizer>,
        keep_remainder: bool,
    ) -> Self {
        Self {
            records,
            indices,
            cursor: 0,
            rank,
            batch_size,
            batches_yielded: 0,
            keep_remainder,
            tokenizer,
        }
    }

    /// Next batch of token sequences.
    ///
    /// # Errors
    ///
    /// [`Error::EndOfShard`] once fewer than `batch_size` records remain
    /// (or none, when the remainder is kept); tokenizer errors otherwise.
    pub fn next_batch(&mut self) -> Result<Batch> {
        let remaining = self.indices.len() - self.cursor;
        let take = if remaining >= self.batch_size {
            self.batch_size
        } else if self.keep_remainder && remaining > 0 {
            remaining
        } else {
            return Err(Error::EndOfShard { rank: self.rank, batches: self.batches_yielded });
        };

        let sequences = self.indices[self.cursor..self.cursor + take]
            .iter()
            .map(|&i| self.tokenizer.encode(&self.records[i].text))
            .collect::<Result<Vec<_>>>()?;
        self.cursor += take;
        self.batches_yielded += 1;
        Ok(Batch::new(sequences))
    }

    /// Number of batches this pass yields in total.
    pub fn num_batches(&self) -> usize {
        let full = self.indices.len() / self.batch_size;
        if self.keep_remainder && !self.indices.len().is_multiple_of(self.batch_size) {
            full + 1
        } else {
            full
        }
    }

    /// Records that a full pass leaves unused.
    pub fn dropped_records(&self) -> usize {
        if self.keep_remainder {
            0
        } else {
            self.indices.len() % self.batch_size
        }
    }

    /// Dataset indices owned by this shard, in visiting order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Batches handed out so far.
    pub fn batches_yielded(&self) -> usize {
        self.batches_yielded
    }
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("rank", &self.rank)
            .field("records", &self.indices.len())
            .field("batch_size", &self.batch_size)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl Iterator for Shard {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_batch() {
            Err(Error::EndOfShard { .. }) => None,
            other => Some(other),
        }
    }
}

/// Re-iterable source of per-epoch shards for one rank.
///
/// Owns the dataset and the partition; [`ShardedDataset::epoch`] restarts
/// the pass and, when a seed is set, reshuffles the order inside the
/// shard. Shard membership never changes between epochs.
#[derive(Clone)]
pub struct ShardedDataset {
    records: Arc<[TextRecord]>,
    tokenizer: Arc<dyn Tokenizer>,
    ctx: WorkerContext,
    batch_size: usize,
    policy: ShardPolicy,
    shuffle_seed: Option<u64>,
    keep_remainder: bool,
}

impl ShardedDataset {
    /// Create a sharded dataset.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if `batch_size` is zero.
    pub fn new(
        records: Vec<TextRecord>,
        tokenizer: Arc<dyn Tokenizer>,
        ctx: WorkerContext,
        batch_size: usize,
        policy: ShardPolicy,
    ) -> Result<Self> {
        check_batch_size(batch_size)?;
        Ok(Self {
            records: records.into(),
            tokenizer,
            ctx,
            batch_size,
            policy,
            shuffle_seed: None,
            keep_remainder: false,
        })
    }

    /// Shuffle within the shard every epoch, seeded by `seed` and the epoch.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Yield a final partial batch instead of dropping it (evaluation).
    pub fn keep_remainder(mut self) -> Self {
        self.keep_remainder = true;
        self
    }

    /// Fresh shard for `epoch`.
    pub fn epoch(&self, epoch: usize) -> Shard {
        let mut indices = self.policy.indices(self.records.len(), &self.ctx);
        if let Some(seed) = self.shuffle_seed {
            let epoch_seed = seed
                .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                .wrapping_add(epoch as u64)
                .wrapping_add((self.ctx.rank() as u64) << 32);
            indices.shuffle(&mut StdRng::seed_from_u64(epoch_seed));
        }
        Shard::new(
            Arc::clone(&self.records),
            indices,
            self.ctx.rank(),
            self.batch_size,
            Arc::clone(&self.tokenizer),
            self.keep_remainder,
        )
    }

    /// Worker the shards are cut for.
    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    /// Total records across all ranks.
    pub fn dataset_len(&self) -> usize {
        self.records.len()
    }

    /// Per-worker batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Batch size summed over the whole group.
    pub fn global_batch_size(&self) -> usize {
        self.batch_size * self.ctx.group_size()
    }

    /// Batches per epoch on this rank.
    pub fn batches_per_epoch(&self) -> usize {
        self.epoch(0).num_batches()
    }
}

impl std::fmt::Debug for ShardedDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedDataset")
            .field("records", &self.records.len())
            .field("ctx", &self.ctx)
            .field("batch_size", &self.batch_size)
            .field("policy", &self.policy)
            .field("shuffle_seed", &self.shuffle_seed)
            .finish()
    }
}
