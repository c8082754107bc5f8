//! Polynomial-decay sparsity schedule methods.
//!
//! `s(t) = s_f + (s_i - s_f) * (1 - (t - t_0) / (t_1 - t_0))^power`

#[cfg(test)]
mod proptests;
#[cfg(test)]
mod tests;

use super::SparsitySchedule;

impl SparsitySchedule {
    /// Target sparsity for the Polynomial shape.
    pub(super) fn polynomial_target_at(
        begin_step: usize,
        end_step: usize,
        initial_sparsity: f32,
        final_sparsity: f32,
        power: f32,
        step: usize,
    ) -> f32 {
        if step < begin_step {
            initial_sparsity
        } else if step >= end_step {
            final_sparsity
        } else {
            let progress = (step - begin_step) as f32 / (end_step - begin_step) as f32;
            let remaining = (1.0 - progress).clamp(0.0, 1.0);
            let target = final_sparsity + (initial_sparsity - final_sparsity) * remaining.powf(power);
            target.clamp(initial_sparsity, final_sparsity)
        }
    }

    /// Validate the Polynomial shape.
    pub(super) fn polynomial_validate(
        begin_step: usize,
        end_step: usize,
        power: f32,
    ) -> Result<(), String> {
        if end_step <= begin_step {
            return Err(format!(
                "end_step ({end_step}) must be greater than begin_step ({begin_step})"
            ));
        }
        if !(power.is_finite() && power > 0.0) {
            return Err(format!("power ({power}) must be a positive number"));
        }
        Ok(())
    }
}
