//! Property tests for the shard partition.

use super::*;
use crate::dist::WorkerContext;
use proptest::prelude::*;
use std::collections::HashSet;

fn policy() -> impl Strategy<Value = ShardPolicy> {
    prop_oneof![Just(ShardPolicy::Interleave), Just(ShardPolicy::Contiguous)]
}

proptest! {
    #[test]
    fn prop_shards_disjoint_and_complete(len in 0usize..500, size in 1usize..16, policy in policy()) {
        let mut seen = HashSet::new();
        for rank in 0..size {
            let ctx = WorkerContext::new(rank, size).unwrap();
            for idx in policy.indices(len, &ctx) {
                prop_assert!(seen.insert(idx), "index {} assigned twice", idx);
            }
        }
        prop_assert_eq!(seen.len(), len);
    }

    #[test]
    fn prop_shard_sizes_differ_by_at_most_one(len in 0usize..500, size in 1usize..16, policy in policy()) {
        let sizes: Vec<usize> = (0..size)
            .map(|r| policy.indices(len, &WorkerContext::new(r, size).unwrap()).len())
            .collect();
        let min = sizes.iter().copied().min().unwrap_or(0);
        let max = sizes.iter().copied().max().unwrap_or(0);
        prop_assert!(max - min <= 1);
    }
}
