//! Property-based tests for the polynomial-decay schedule.

use crate::prune::schedule::{ScheduleShape, SparsitySchedule};
use proptest::prelude::*;

proptest! {
    /// schedule(t1) <= schedule(t2) for all t1 < t2
    #[test]
    fn polynomial_monotonic(
        begin in 0usize..500,
        duration in 1usize..500,
        initial in 0.0f32..0.5,
        final_val in 0.5f32..1.0,
        power in 0.25f32..6.0,
    ) {
        let schedule = SparsitySchedule::new(
            ScheduleShape::Polynomial { power },
            initial,
            final_val,
            begin,
            begin + duration,
            1,
        ).unwrap();

        let mut prev = schedule.target_at(0);
        for step in 0..=(begin + duration + 10) {
            let sparsity = schedule.target_at(step);
            prop_assert!(sparsity >= prev, "decreased at step {}: {} < {}", step, sparsity, prev);
            prev = sparsity;
        }
    }

    /// Targets stay within [initial, final]
    #[test]
    fn polynomial_bounded(
        begin in 0usize..100,
        duration in 1usize..100,
        initial in 0.0f32..0.5,
        final_val in 0.5f32..1.0,
        step in 0usize..500,
    ) {
        let schedule = SparsitySchedule::polynomial_decay(initial, final_val, begin, begin + duration).unwrap();
        let sparsity = schedule.target_at(step);
        prop_assert!(sparsity >= initial);
        prop_assert!(sparsity <= final_val);
    }

    /// Any decreasing schedule is rejected at construction
    #[test]
    fn decreasing_rejected(
        initial in 0.01f32..1.0,
        drop in 0.001f32..0.5,
    ) {
        let final_val = (initial - drop).max(0.0);
        prop_assume!(final_val < initial);
        prop_assert!(SparsitySchedule::polynomial_decay(initial, final_val, 0, 100).is_err());
    }
}
