//! Property tests for mask monotonicity.

use super::*;
use crate::dist::BoundDevice;
use crate::model::{BigramConfig, BigramLm, LanguageModel};
use ndarray::Array2;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_masked_weights_stay_masked(
        seed in 0u64..1000,
        final_sparsity in 0.05f32..0.95,
        block_width in 1usize..5,
        max_pool in any::<bool>(),
    ) {
        let model = BigramLm::new(BigramConfig::new(12, 6), &BoundDevice::cpu(), seed).unwrap();
        let schedule = SparsitySchedule::polynomial_decay(0.0, final_sparsity, 0, 50)
            .unwrap()
            .with_frequency(5)
            .unwrap();
        let pooling = if max_pool { BlockPooling::Max } else { BlockPooling::Avg };
        let config = PruningConfig::new(schedule)
            .with_block(BlockShape::new(1, block_width))
            .with_pooling(pooling);
        let mut p = PrunableModel::wrap(model, config).unwrap();

        let mut previous: Vec<Option<Array2<f32>>> = p.masks().to_vec();
        let mut last_sparsity = 0.0;
        for step in 0..=60 {
            // perturb weights so magnitudes change between updates
            for (i, param) in p.parameters_mut().iter_mut().enumerate() {
                param.value.mapv_inplace(|w| w * (1.0 + 0.01 * ((step + i) % 3) as f32));
            }
            p.update_masks(step);
            for (old, new) in previous.iter().zip(p.masks()) {
                if let (Some(old), Some(new)) = (old, new) {
                    for (&o, &n) in old.iter().zip(new.iter()) {
                        prop_assert!(!(o == 0.0 && n != 0.0), "unmasked a weight at step {}", step);
                    }
                }
            }
            prop_assert!(p.sparsity() >= last_sparsity);
            last_sparsity = p.sparsity();
            previous = p.masks().to_vec();
        }
    }

    #[test]
    fn prop_finalize_idempotent(seed in 0u64..1000, sparsity in 0.0f32..1.0) {
        let model = BigramLm::new(BigramConfig::new(10, 4), &BoundDevice::cpu(), seed).unwrap();
        let config = PruningConfig::new(SparsitySchedule::constant(sparsity, 0).unwrap());
        let mut p = PrunableModel::wrap(model, config.clone()).unwrap();
        p.update_masks(0);
        let once = p.finalize();
        let twice = PrunableModel::wrap(once.clone(), config).unwrap().finalize();
        prop_assert_eq!(once.parameters(), twice.parameters());
    }
}
