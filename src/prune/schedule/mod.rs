//! Sparsity schedule definitions
//!
//! Defines how the target sparsity grows during training:
//! - Constant: jump to the final sparsity at `begin_step`
//! - Polynomial decay: `final + (initial - final) * (1 - p)^power`
//!   (linear for `power = 1`, Zhu & Gupta for `power = 3`)
//!
//! # References
//! - Zhu, M., & Gupta, S. (2017). To prune, or not to prune: exploring the
//!   efficacy of pruning for model compression. arXiv:1710.01878.

mod constant;
mod polynomial;
mod types;

pub use types::{ScheduleShape, ScheduleSpec, SparsitySchedule, DEFAULT_FREQUENCY, DEFAULT_POWER};

use crate::error::{Error, Result};

impl SparsitySchedule {
    /// Target sparsity at a given training step, in `[0, 1]`.
    ///
    /// Flat at `initial_sparsity` before `begin_step` and at
    /// `final_sparsity` from `end_step` on.
    pub fn target_at(&self, step: usize) -> f32 {
        match self.shape {
            ScheduleShape::Constant => Self::constant_target_at(
                self.begin_step,
                self.initial_sparsity,
                self.final_sparsity,
                step,
            ),
            ScheduleShape::Polynomial { power } => Self::polynomial_target_at(
                self.begin_step,
                self.end_step,
                self.initial_sparsity,
                self.final_sparsity,
                power,
                step,
            ),
        }
    }

    /// Whether masks should be recomputed after `step`.
    ///
    /// True every `frequency` steps inside `[begin_step, end_step]` and
    /// always at `end_step`, so the final sparsity is actually reached.
    pub fn should_update(&self, step: usize) -> bool {
        if step < self.begin_step || step > self.end_step {
            return false;
        }
        step == self.end_step || (step - self.begin_step).is_multiple_of(self.frequency)
    }

    /// Number of mask recomputations over the whole schedule.
    pub fn num_updates(&self) -> usize {
        let span = self.end_step - self.begin_step;
        let periodic = span / self.frequency + 1;
        if span.is_multiple_of(self.frequency) {
            periodic
        } else {
            periodic + 1
        }
    }

    /// Whether the schedule has no further mask updates after `step`.
    pub fn is_complete(&self, step: usize) -> bool {
        step >= self.end_step
    }

    /// Check the schedule invariants.
    ///
    /// # Errors
    ///
    /// [`Error::ScheduleInvariant`] if sparsities are outside `[0, 1]`,
    /// the final sparsity is below the initial one, the ramp is empty, the
    /// power is not positive, or the frequency is zero.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| -> Result<()> { Err(Error::ScheduleInvariant(msg)) };

        if !(0.0..=1.0).contains(&self.initial_sparsity) {
            return bad(format!(
                "initial_sparsity ({}) must be between 0.0 and 1.0",
                self.initial_sparsity
            ));
        }
        if !(0.0..=1.0).contains(&self.final_sparsity) {
            return bad(format!(
                "final_sparsity ({}) must be between 0.0 and 1.0",
                self.final_sparsity
            ));
        }
        if self.final_sparsity < self.initial_sparsity {
            return bad(format!(
                "final_sparsity ({}) is below initial_sparsity ({}); sparsity may never decrease",
                self.final_sparsity, self.initial_sparsity
            ));
        }
        if self.frequency == 0 {
            return bad("frequency must be greater than 0".to_string());
        }
        match self.shape {
            ScheduleShape::Constant => {
                Self::constant_validate(self.begin_step, self.end_step).or_else(bad)
            }
            ScheduleShape::Polynomial { power } => {
                Self::polynomial_validate(self.begin_step, self.end_step, power).or_else(bad)
            }
        }
    }
}
