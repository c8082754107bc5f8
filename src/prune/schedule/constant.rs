//! Constant sparsity schedule methods.

use super::SparsitySchedule;

impl SparsitySchedule {
    /// Target sparsity for the Constant shape.
    pub(super) fn constant_target_at(
        begin_step: usize,
        initial_sparsity: f32,
        final_sparsity: f32,
        step: usize,
    ) -> f32 {
        if step < begin_step {
            initial_sparsity
        } else {
            final_sparsity
        }
    }

    /// Validate the Constant shape.
    pub(super) fn constant_validate(begin_step: usize, end_step: usize) -> Result<(), String> {
        if end_step < begin_step {
            return Err(format!(
                "end_step ({end_step}) must not be before begin_step ({begin_step})"
            ));
        }
        Ok(())
    }
}
